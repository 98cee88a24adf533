use anyhow::{anyhow, bail, Result};
use fieldsync_api::{AssetId, Position};
use std::path::PathBuf;

pub const USAGE: &str = "\
Usage: fieldsync [--config <path>] [--db <path>] <command>

Commands:
  run                       Keep the cache in sync until Ctrl-C
  list                      Print every cached asset as a map feature
  pending                   Print assets waiting to be pushed
  place <lng> <lat> [name]  Capture a new pole at the given position
  cable <from-id> <to-id>   Capture a cable between two point assets
  push                      Push pending assets once
  pull                      Refresh the cache from the remote once
";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run,
    List,
    Pending,
    Place {
        position: Position,
        name: Option<String>,
    },
    Cable {
        from: AssetId,
        to: AssetId,
    },
    Push,
    Pull,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub db_path: Option<PathBuf>,
    pub command: Command,
}

pub fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut args = args.into_iter();
    let mut config_path = None;
    let mut db_path = None;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().ok_or_else(|| anyhow!("--config needs a path"))?;
                config_path = Some(PathBuf::from(path));
            }
            "--db" => {
                let path = args.next().ok_or_else(|| anyhow!("--db needs a path"))?;
                db_path = Some(PathBuf::from(path));
            }
            flag if flag.starts_with("--") => bail!("Unknown option '{}'", flag),
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        None | Some("run") => Command::Run,
        Some("list") => Command::List,
        Some("pending") => Command::Pending,
        Some("push") => Command::Push,
        Some("pull") => Command::Pull,
        Some("place") => {
            let lng = parse_coordinate(positional.next(), "lng")?;
            let lat = parse_coordinate(positional.next(), "lat")?;
            let position = Position::new(lng, lat);
            position.validate()?;
            Command::Place {
                position,
                name: positional.next(),
            }
        }
        Some("cable") => {
            let from = positional
                .next()
                .ok_or_else(|| anyhow!("cable needs a <from-id>"))?;
            let to = positional
                .next()
                .ok_or_else(|| anyhow!("cable needs a <to-id>"))?;
            Command::Cable {
                from: AssetId::parse(&from),
                to: AssetId::parse(&to),
            }
        }
        Some(other) => bail!("Unknown command '{}'", other),
    };

    if let Some(extra) = positional.next() {
        bail!("Unexpected argument '{}'", extra);
    }

    Ok(CliArgs {
        config_path,
        db_path,
        command,
    })
}

fn parse_coordinate(raw: Option<String>, what: &str) -> Result<f64> {
    let raw = raw.ok_or_else(|| anyhow!("place needs <{}>", what))?;
    raw.parse()
        .map_err(|e| anyhow!("Invalid {} '{}': {}", what, raw, e))
}
