//! Start-up: reading the command line and finding out who we are.

use local_ip_address::local_ip;

use crate::config::{self, FloorConfig};
use crate::ip_help_functions::{ip2id, offline_id};
use crate::print::{Logger, PrintConfig};
use crate::types::NodeId;

/// Everything decided at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Explicit node id from `id::`, resolved by [resolve_node_id] when `None`
    pub node_id: Option<NodeId>,
    pub floors: FloorConfig,
    pub print: PrintConfig,
    /// Ledger file from `db::`
    pub db_path: String,
    /// Set by `help`: print the usage and exit
    pub help: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            node_id: None,
            floors: FloorConfig::default(),
            print: PrintConfig::default(),
            db_path: config::LEDGER_DB_PATH.to_string(),
            help: false,
        }
    }
}

/// ### Reads arguments from `cargo run`
///
/// Available options:
///
/// `id::<name>` &rarr; Node id, instead of the one derived from the IP address
/// `floors::<n>` &rarr; Number of floors in the building
/// `bottom::<n>` &rarr; Number of the lowest floor
///
/// `db::<path>` &rarr; File the ledger is kept in
/// `print_err::(true/false)` &rarr; Prints error messages
/// `print_warn::(true/false)` &rarr; Prints warning messages
/// `print_ok::(true/false)` &rarr; Prints OK messages
/// `print_info::(true/false)` &rarr; Prints informational messages
/// `print_ledger::(true/false)` &rarr; Prints the ledger on every gossip round
/// `debug::` &rarr; Disables all prints except error messages
/// `help` &rarr; Displays all possible arguments without starting the program
///
/// If no arguments are provided, all prints except the ledger are enabled by default.
/// Unknown keys are ignored. A number that does not parse is an error.
pub fn parse_args<I, S>(args: I) -> anyhow::Result<RunConfig>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut cfg = RunConfig::default();
    let mut num = cfg.floors.num;
    let mut bottom = cfg.floors.bottom;

    for arg in args {
        let arg = arg.as_ref();
        let Some((key, value)) = arg.split_once("::") else {
            if arg.eq_ignore_ascii_case("help") {
                cfg.help = true;
            }
            continue;
        };
        let key = key.to_lowercase();
        let is_true = value.eq_ignore_ascii_case("true");

        match key.as_str() {
            "id" if !value.is_empty() => cfg.node_id = Some(value.to_string()),
            "floors" => {
                num = value
                    .parse()
                    .map_err(|e| anyhow::anyhow!("floors::{} is not a floor count: {}", value, e))?
            }
            "bottom" => {
                bottom = value
                    .parse()
                    .map_err(|e| anyhow::anyhow!("bottom::{} is not a floor: {}", value, e))?
            }
            "db" if !value.is_empty() => cfg.db_path = value.to_string(),
            "print_err" => cfg.print.err = is_true,
            "print_warn" => cfg.print.warn = is_true,
            "print_ok" => cfg.print.ok = is_true,
            "print_info" => cfg.print.info = is_true,
            "print_ledger" => cfg.print.ledger = is_true,
            // Debug modus: Kun error-meldingar
            "debug" => cfg.print = PrintConfig::debug(),
            _ => {}
        }
    }
    cfg.floors = FloorConfig::new(num, bottom)?;
    Ok(cfg)
}

/// Prints every available argument.
pub fn print_help() {
    println!("Tilgjengelige argument:");
    println!("  id::<namn>             (standard: siste del av IP-adressa)");
    println!("  floors::<n>            (standard: {})", config::DEFAULT_NUM_FLOORS);
    println!("  bottom::<n>            (standard: {})", config::DEFAULT_BOTTOM_FLOOR);
    println!("  db::<fil>              (standard: {})", config::LEDGER_DB_PATH);
    println!("  print_err::true/false");
    println!("  print_warn::true/false");
    println!("  print_ok::true/false");
    println!("  print_info::true/false");
    println!("  print_ledger::true/false");
    println!("  debug:: (kun error-meldingar vises)");
}

/// The id of this node: `explicit` if given, else derived from the local IP, else an offline id.
pub fn resolve_node_id(explicit: Option<NodeId>, log: &Logger) -> NodeId {
    if let Some(id) = explicit {
        return id;
    }
    match local_ip() {
        Ok(ip) => ip2id(ip),
        Err(e) => {
            let id = offline_id();
            log.warn("Failed to get local IP at startup", &[("error", &e), ("id", &id)]);
            id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arguments_gives_defaults() {
        let cfg = parse_args(Vec::<String>::new()).unwrap();
        assert_eq!(cfg, RunConfig::default());
    }

    #[test]
    fn reads_known_keys() {
        let cfg = parse_args(["id::alpha", "floors::6", "bottom::-1", "print_info::false", "print_ledger::true", "db::/tmp/a.redb", "junk::1"]).unwrap();
        assert_eq!(cfg.node_id.as_deref(), Some("alpha"));
        assert_eq!(cfg.floors, FloorConfig { num: 6, bottom: -1 });
        assert!(!cfg.print.info);
        assert!(cfg.print.ledger);
        assert_eq!(cfg.db_path, "/tmp/a.redb");
        assert!(!cfg.help);
    }

    #[test]
    fn debug_and_help() {
        let cfg = parse_args(["debug::", "HELP"]).unwrap();
        assert_eq!(cfg.print, PrintConfig::debug());
        assert!(cfg.help);
    }

    #[test]
    fn bad_numbers_are_errors() {
        assert!(parse_args(["floors::many"]).is_err());
        assert!(parse_args(["floors::0"]).is_err());
        assert!(parse_args(["bottom::x"]).is_err());
    }

    #[test]
    fn explicit_id_wins() {
        assert_eq!(resolve_node_id(Some("me".into()), &Logger::silent()), "me");
    }
}
