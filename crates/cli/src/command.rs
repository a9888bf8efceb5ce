//! Command-line parsing.

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context};

use kbase_core::{EntryDraft, EntryId, TenantId};

pub const USAGE: &str = "\
usage: kbase <command> <tenant> [args]

commands:
  entries <tenant>                                  list entries
  add <tenant> <question> <answer> [--id ID] [--type TYPE] [--source SOURCE]
                                                    create or update an entry
  delete <tenant> <entry-id>                        delete an entry
  train <tenant> [--by NAME]                        train and wait (Ctrl-C cancels)
  status <tenant>                                   training status
  predict <tenant> <query> [--lang LANG]            rank answers for a query

environment:
  KBASE_DATA_DIR, KBASE_DISABLE_TRAINING, KBASE_MAX_TRAINING_SECS,
  KBASE_PREDICTION_LIMIT, KBASE_LOG_FORMAT, RUST_LOG";

pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Entries { tenant_id: TenantId },
    Add { tenant_id: TenantId, draft: EntryDraft },
    Delete { tenant_id: TenantId, entry_id: EntryId },
    Train { tenant_id: TenantId, started_by: Option<String> },
    Status { tenant_id: TenantId },
    Predict { tenant_id: TenantId, query: String, language: String },
}

/// Split arguments into positionals and `--flag value` pairs.
fn split(args: &[String], known: &[&str]) -> anyhow::Result<(Vec<String>, HashMap<String, String>)> {
    let mut positional = Vec::new();
    let mut flags = HashMap::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        if let Some(name) = arg.strip_prefix("--") {
            if !known.contains(&name) {
                bail!("unknown option --{name}");
            }
            let value = iter
                .next()
                .ok_or_else(|| anyhow!("option --{name} needs a value"))?;
            flags.insert(name.to_string(), value.clone());
        } else {
            positional.push(arg.clone());
        }
    }
    Ok((positional, flags))
}

fn expect_args(command: &str, positional: &[String], count: usize) -> anyhow::Result<()> {
    if positional.len() != count {
        bail!(
            "{command} takes {count} argument(s), got {}",
            positional.len()
        );
    }
    Ok(())
}

fn tenant(raw: &str) -> anyhow::Result<TenantId> {
    TenantId::from_str(raw).with_context(|| format!("invalid tenant id {raw:?}"))
}

pub fn parse(args: &[String]) -> anyhow::Result<Command> {
    let Some((name, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    match name.as_str() {
        "help" | "-h" | "--help" => Ok(Command::Help),
        "entries" => {
            let (pos, _) = split(rest, &[])?;
            expect_args(name, &pos, 1)?;
            Ok(Command::Entries {
                tenant_id: tenant(&pos[0])?,
            })
        }
        "add" => {
            let (pos, flags) = split(rest, &["id", "type", "source"])?;
            expect_args(name, &pos, 3)?;
            let mut draft = EntryDraft::new(pos[1].clone(), pos[2].clone());
            if let Some(id) = flags.get("id") {
                draft = draft.with_id(id.clone());
            }
            if let Some(kind) = flags.get("type") {
                draft = draft.with_kind(kind.clone());
            }
            if let Some(source) = flags.get("source") {
                draft = draft.with_source(source.clone());
            }
            Ok(Command::Add {
                tenant_id: tenant(&pos[0])?,
                draft,
            })
        }
        "delete" => {
            let (pos, _) = split(rest, &[])?;
            expect_args(name, &pos, 2)?;
            Ok(Command::Delete {
                tenant_id: tenant(&pos[0])?,
                entry_id: EntryId::parse(&pos[1])?,
            })
        }
        "train" => {
            let (pos, mut flags) = split(rest, &["by"])?;
            expect_args(name, &pos, 1)?;
            Ok(Command::Train {
                tenant_id: tenant(&pos[0])?,
                started_by: flags.remove("by"),
            })
        }
        "status" => {
            let (pos, _) = split(rest, &[])?;
            expect_args(name, &pos, 1)?;
            Ok(Command::Status {
                tenant_id: tenant(&pos[0])?,
            })
        }
        "predict" => {
            let (pos, mut flags) = split(rest, &["lang"])?;
            expect_args(name, &pos, 2)?;
            Ok(Command::Predict {
                tenant_id: tenant(&pos[0])?,
                query: pos[1].clone(),
                language: flags
                    .remove("lang")
                    .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            })
        }
        other => bail!("unknown command {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_arguments_is_help() {
        assert_eq!(parse(&[]).unwrap(), Command::Help);
    }

    #[test]
    fn parses_add_with_options() {
        let t = TenantId::new();
        let cmd = parse(&args(&[
            "add",
            &t.to_string(),
            "hours?",
            "9-5",
            "--id",
            "faq-1",
            "--source",
            "import",
        ]))
        .unwrap();

        let expected = EntryDraft::new("hours?", "9-5")
            .with_id("faq-1")
            .with_source("import");
        assert_eq!(
            cmd,
            Command::Add {
                tenant_id: t,
                draft: expected
            }
        );
    }

    #[test]
    fn predict_defaults_language() {
        let t = TenantId::new();
        let cmd = parse(&args(&["predict", &t.to_string(), "hours"])).unwrap();
        assert!(matches!(cmd, Command::Predict { language, .. } if language == "en"));
    }

    #[test]
    fn rejects_bad_input() {
        let t = TenantId::new().to_string();
        assert!(parse(&args(&["entries", "not-a-uuid"])).is_err());
        assert!(parse(&args(&["train", &t, "--by"])).is_err());
        assert!(parse(&args(&["train", &t, "--force", "x"])).is_err());
        assert!(parse(&args(&["delete", &t, "../escape"])).is_err());
        assert!(parse(&args(&["frobnicate"])).is_err());
    }
}
