//! `kbase`: operator CLI over the file-backed knowledge base.

pub mod command;

use std::io::Write;

use anyhow::{bail, Context};
use serde::Serialize;
use tracing::{info, warn};

use kbase_core::TenantId;
use kbase_infra::training::JobState;
use kbase_infra::{KbConfig, KnowledgeBase};

use crate::command::{Command, USAGE};

pub const DEFAULT_DATA_DIR: &str = "kbase-data";

/// Load configuration and run one command against the knowledge base.
pub async fn run(command: Command) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    if command == Command::Help {
        writeln!(out, "{USAGE}")?;
        return Ok(());
    }

    let config = config();
    let kb = KnowledgeBase::open(&config).context("could not open knowledge base")?;
    execute(&kb, command, &mut out).await
}

fn config() -> KbConfig {
    let config = KbConfig::from_env();
    if config.data_dir.is_some() {
        return config;
    }
    warn!("KBASE_DATA_DIR not set; using ./{DEFAULT_DATA_DIR}");
    config.with_data_dir(DEFAULT_DATA_DIR)
}

pub async fn execute(kb: &KnowledgeBase, command: Command, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Command::Help => writeln!(out, "{USAGE}")?,
        Command::Entries { tenant_id } => print_json(out, &kb.list_entries(tenant_id)?)?,
        Command::Add { tenant_id, draft } => {
            let id = kb.upsert_entry(tenant_id, &draft)?;
            print_json(out, &serde_json::json!({ "id": id }))?;
        }
        Command::Delete { tenant_id, entry_id } => {
            kb.delete_entry(tenant_id, &entry_id)?;
            writeln!(out, "deleted {entry_id}")?;
        }
        Command::Train {
            tenant_id,
            started_by,
        } => train(kb, tenant_id, started_by, out).await?,
        Command::Status { tenant_id } => print_json(out, &kb.training_status(tenant_id))?,
        Command::Predict {
            tenant_id,
            query,
            language,
        } => print_json(out, &kb.predict(tenant_id, &query, &language).await?)?,
    }
    Ok(())
}

/// Train and wait for the outcome. Ctrl-C requests cancellation.
async fn train(
    kb: &KnowledgeBase,
    tenant_id: TenantId,
    started_by: Option<String>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut handle = match started_by {
        Some(by) => kb.start_training_by(tenant_id, by).await?,
        None => kb.start_training(tenant_id).await?,
    };
    info!(tenant_id = %tenant_id, job_id = %handle.job_id(), "training started");

    let mut waiter = handle.clone();
    let job = tokio::select! {
        job = waiter.wait() => job,
        _ = tokio::signal::ctrl_c() => {
            warn!(tenant_id = %tenant_id, "interrupted; cancelling training");
            handle.cancel()?;
            handle.wait().await
        }
    };

    let Some(job) = job else {
        bail!("training ended without an outcome");
    };
    print_json(out, &job)?;
    match job.state {
        JobState::Failed => bail!(
            "training failed: {}",
            job.error.as_deref().unwrap_or("unknown error")
        ),
        _ => Ok(()),
    }
}

fn print_json(out: &mut impl Write, value: &impl Serialize) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use kbase_ai::{
        LoadedModel, ModelArtifact, ModelCapability, ModelError, TfIdfModel, TrainOutcome, TrainingContext,
    };
    use kbase_core::{Entry, EntryDraft};
    use kbase_infra::entry_store::InMemoryEntryStore;
    use kbase_infra::model_store::InMemoryModelStore;

    async fn run_with(kb: &KnowledgeBase, command: Command) -> anyhow::Result<String> {
        let mut out = Vec::new();
        execute(kb, command, &mut out).await?;
        Ok(String::from_utf8(out)?)
    }

    #[tokio::test]
    async fn add_train_predict_round() {
        let dir = tempfile::tempdir().unwrap();
        let kb = KnowledgeBase::open(&KbConfig::default().with_data_dir(dir.path())).unwrap();
        let tenant_id = TenantId::new();

        let added = run_with(
            &kb,
            Command::Add {
                tenant_id,
                draft: EntryDraft::new("hours?", "9-5").with_id("hours"),
            },
        )
        .await
        .unwrap();
        assert!(added.contains("\"hours\""));

        let trained = run_with(
            &kb,
            Command::Train {
                tenant_id,
                started_by: Some("ops".into()),
            },
        )
        .await
        .unwrap();
        assert!(trained.contains("\"completed\""));

        let predicted = run_with(
            &kb,
            Command::Predict {
                tenant_id,
                query: "hours?".into(),
                language: "en".into(),
            },
        )
        .await
        .unwrap();
        let results: serde_json::Value = serde_json::from_str(&predicted).unwrap();
        assert_eq!(results[0]["content"], "9-5");
    }

    struct UnreachableTrainer;

    impl ModelCapability for UnreachableTrainer {
        fn name(&self) -> &str {
            "unreachable"
        }

        fn train(&self, _: &[Entry], _: &TrainingContext) -> Result<TrainOutcome, ModelError> {
            Err(ModelError::TrainingFailed("trainer unreachable".to_string()))
        }

        fn load(&self, artifact: &ModelArtifact) -> Result<Arc<dyn LoadedModel>, ModelError> {
            TfIdfModel.load(artifact)
        }
    }

    #[tokio::test]
    async fn failed_training_is_an_error() {
        let kb = KnowledgeBase::new(
            &KbConfig::default(),
            Arc::new(InMemoryEntryStore::new()),
            Arc::new(InMemoryModelStore::new()),
            Arc::new(UnreachableTrainer),
        );
        let err = run_with(
            &kb,
            Command::Train {
                tenant_id: TenantId::new(),
                started_by: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("training failed"));
        assert!(err.to_string().contains("trainer unreachable"));
    }

    #[tokio::test]
    async fn deleting_unknown_entry_fails() {
        let kb = KnowledgeBase::in_memory(&KbConfig::default());
        let result = run_with(
            &kb,
            Command::Delete {
                tenant_id: TenantId::new(),
                entry_id: kbase_core::EntryId::parse("missing").unwrap(),
            },
        )
        .await;
        assert!(result.is_err());
    }
}
