use anyhow::{Context, anyhow, bail};
use kvlens_core::{
    ConfigStore, ContentView, Explorer, Format, KeyType, KeyViewState, StoreRegistry,
};
use kvlens_driver_redis::{RedisDriver, sanitize_uri};
use log::debug;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

const USAGE: &str = "\
Usage: kvlens [OPTIONS] <COMMAND>

Commands:
  list [PATTERN]                 List keys matching a glob pattern
  filter <TEXT> [PATTERN]        List keys whose name contains TEXT
  show <KEY>                     Print a key's content
  create <TYPE> <KEY> <VALUE>    Create a key (string, hash, list, set, zset)
  update <KEY> <CONTENT>         Replace a key's content (`-` reads stdin)
  delete <KEY>                   Delete a key
  cmd <COMMAND...>               Run a raw command
  info                           Print server INFO
  databases                      Print the number of databases

Options:
  --config <PATH>     Config file (default: <config dir>/kvlens/config.json)
  --server <NAME>     Server from the config (default: the first one)
  --db <INDEX>        Database index
  --format <FORMAT>   String, JSON or Quoted
  --ttl <TTL>         Expiry for create, e.g. 10s, 5m, 1h, 1d
  --json              Print `show` output as JSON
  -h, --help          Print this help";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub config: Option<PathBuf>,
    pub server: Option<String>,
    pub database: Option<u32>,
    pub format: Option<Format>,
    pub ttl: String,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List {
        pattern: String,
    },
    Filter {
        text: String,
        pattern: String,
    },
    Show {
        key: String,
    },
    Create {
        key_type: KeyType,
        key: String,
        value: String,
    },
    Update {
        key: String,
        content: String,
    },
    Delete {
        key: String,
    },
    Raw {
        command: String,
    },
    Info,
    Databases,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub options: Options,
    pub command: Command,
}

pub fn run(args: &[String]) -> i32 {
    let invocation = match parse_args(args.get(1..).unwrap_or_default()) {
        Ok(invocation) => invocation,
        Err(message) => {
            eprintln!("{}\n\n{}", message, USAGE);
            return 2;
        }
    };

    if invocation.command == Command::Help {
        println!("{}", USAGE);
        return 0;
    }

    match connect_and_execute(invocation) {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("Error: {:#}", error);
            1
        }
    }
}

pub fn parse_args(args: &[String]) -> Result<Invocation, String> {
    let mut options = Options::default();
    let mut positional = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        // Everything after `cmd` belongs to the raw command.
        if positional.first().is_some_and(|first: &String| first == "cmd") {
            positional.push(arg.clone());
            continue;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                return Ok(Invocation {
                    options,
                    command: Command::Help,
                });
            }
            "--json" => options.json = true,
            "--config" => options.config = Some(PathBuf::from(flag_value(&mut iter, arg)?)),
            "--server" => options.server = Some(flag_value(&mut iter, arg)?),
            "--db" => {
                let value = flag_value(&mut iter, arg)?;
                let database = value
                    .parse::<u32>()
                    .map_err(|_| format!("Invalid database index '{}'", value))?;
                options.database = Some(database);
            }
            "--format" => options.format = Some(flag_value(&mut iter, arg)?.parse::<Format>()?),
            "--ttl" => options.ttl = flag_value(&mut iter, arg)?,
            flag if flag.starts_with("--") => return Err(format!("Unknown option '{}'", flag)),
            _ => positional.push(arg.clone()),
        }
    }

    let command = parse_command(&positional)?;
    Ok(Invocation { options, command })
}

/// Re-quotes one shell argument so the command splitter sees it as a single word.
fn quote_word(word: &str) -> String {
    let plain = !word.is_empty()
        && !word
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'));
    if plain {
        return word.to_string();
    }

    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('"');
    for c in word.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

fn flag_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<String, String> {
    iter.next()
        .cloned()
        .ok_or_else(|| format!("Option '{}' needs a value", flag))
}

fn parse_command(positional: &[String]) -> Result<Command, String> {
    let Some((name, rest)) = positional.split_first() else {
        return Err("No command given".to_string());
    };

    let arity = |expected: &str| format!("'{}' expects {}", name, expected);

    let command = match (name.as_str(), rest) {
        ("help", []) => Command::Help,
        ("list", []) => Command::List {
            pattern: String::new(),
        },
        ("list", [pattern]) => Command::List {
            pattern: pattern.clone(),
        },
        ("filter", [text]) => Command::Filter {
            text: text.clone(),
            pattern: String::new(),
        },
        ("filter", [text, pattern]) => Command::Filter {
            text: text.clone(),
            pattern: pattern.clone(),
        },
        ("show", [key]) => Command::Show { key: key.clone() },
        ("create", [key_type, key, value]) => Command::Create {
            key_type: KeyType::parse(key_type)
                .ok_or_else(|| format!("Unknown key type '{}'", key_type))?,
            key: key.clone(),
            value: value.clone(),
        },
        ("update", [key, content]) => Command::Update {
            key: key.clone(),
            content: content.clone(),
        },
        ("delete", [key]) => Command::Delete { key: key.clone() },
        ("cmd", words) if !words.is_empty() => Command::Raw {
            command: words
                .iter()
                .map(|word| quote_word(word))
                .collect::<Vec<_>>()
                .join(" "),
        },
        ("info", []) => Command::Info,
        ("databases", []) => Command::Databases,
        ("list", _) => return Err(arity("at most one pattern")),
        ("filter", _) => return Err(arity("a text and an optional pattern")),
        ("show" | "delete", _) => return Err(arity("a key")),
        ("create", _) => return Err(arity("a type, a key and a value")),
        ("update", _) => return Err(arity("a key and the new content")),
        ("cmd", _) => return Err(arity("a command")),
        ("info" | "databases" | "help", _) => return Err(arity("no arguments")),
        (other, _) => return Err(format!("Unknown command '{}'", other)),
    };

    Ok(command)
}

fn connect_and_execute(invocation: Invocation) -> anyhow::Result<()> {
    let Invocation { options, command } = invocation;

    let config_store = match &options.config {
        Some(path) => ConfigStore::with_path(path),
        None => ConfigStore::new()?,
    };
    let config = config_store.load()?;
    debug!("Loaded config from {}", config_store.path().display());

    let server = match &options.server {
        Some(name) => config
            .server(name)
            .ok_or_else(|| anyhow!("No server named '{}' in {}", name, config_store.path().display()))?,
        None => config
            .default_server()
            .ok_or_else(|| anyhow!("No servers configured in {}", config_store.path().display()))?,
    };

    let store = RedisDriver::new()
        .connect(server)
        .with_context(|| {
            format!("Connecting to {} ({})", server.name, sanitize_uri(&server.addr))
        })?;
    let registry = StoreRegistry::new().with_store(server.name.clone(), Arc::new(store));

    let mut explorer = Explorer::from_config(&config, registry, &server.name)?;
    if let Some(database) = options.database {
        explorer.switch_to(server.name.clone(), Some(database))?;
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(&mut explorer, &options, command, &mut out)
}

/// Runs one command against an explorer, writing results to `out`.
pub fn execute(
    explorer: &mut Explorer,
    options: &Options,
    command: Command,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        Command::List { pattern } => {
            let snapshot = explorer.refresh_keys(&pattern)?;
            for entry in &snapshot.entries {
                writeln!(out, "{}\t{}\t{}", entry.key_type, entry.len, entry.key)?;
            }
        }
        Command::Filter { text, pattern } => {
            explorer.refresh_keys(&pattern)?;
            for entry in explorer.filter(&text) {
                writeln!(out, "{}\t{}\t{}", entry.key_type, entry.len, entry.key)?;
            }
        }
        Command::Show { key } => {
            let state = explorer.open(&key, options.format);
            print_state(state, options.json, out)?;
        }
        Command::Create {
            key_type,
            key,
            value,
        } => {
            let format = options.format.unwrap_or(Format::String);
            let state = explorer.create(key_type, &key, &options.ttl, format, &value)?;
            print_state(state, options.json, out)?;
        }
        Command::Update { key, content } => {
            let content = if content == "-" {
                let mut buffer = String::new();
                io::stdin().read_to_string(&mut buffer)?;
                buffer
            } else {
                content
            };

            let state = explorer.open(&key, options.format).clone();
            let format = match &state {
                KeyViewState::Displayed(view) => view.format.unwrap_or(Format::String),
                KeyViewState::NotFound { .. } => bail!("Key '{}' not found", key),
                KeyViewState::Errored { message, .. } => bail!("{}", message),
                _ => bail!("Key '{}' could not be loaded", key),
            };

            let state = explorer.save(&content, options.format.unwrap_or(format))?;
            print_state(state, options.json, out)?;
        }
        Command::Delete { key } => {
            explorer.open(&key, None);
            if explorer.session().state().view().is_none() {
                writeln!(out, "Key '{}' does not exist", key)?;
                return Ok(());
            }

            let removed = explorer.delete()?;
            writeln!(
                out,
                "{}",
                if removed { "Deleted" } else { "Already gone" }
            )?;
        }
        Command::Raw { command } => {
            let reply = explorer.run_command(&command)?;
            if reply.is_error {
                bail!("(error) {}", reply.text);
            }
            writeln!(out, "{}", reply.text)?;
        }
        Command::Info => {
            let info = explorer.service().server_info(explorer.server())?;
            writeln!(out, "{}", info.trim_end())?;
        }
        Command::Databases => {
            let count = explorer.service().database_count(explorer.server())?;
            writeln!(out, "{}", count)?;
        }
        Command::Help => writeln!(out, "{}", USAGE)?,
    }

    Ok(())
}

fn print_state(state: &KeyViewState, json: bool, out: &mut impl Write) -> anyhow::Result<()> {
    match state {
        KeyViewState::Displayed(view) => print_view(view, json, out),
        KeyViewState::NotFound { key } => bail!("Key '{}' not found", key),
        KeyViewState::Errored { message, .. } => bail!("{}", message),
        other => bail!("Unexpected state {:?}", other),
    }
}

fn print_view(view: &ContentView, json: bool, out: &mut impl Write) -> anyhow::Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(view)?)?;
        return Ok(());
    }

    let key_type = view.key_type.map(KeyType::as_str).unwrap_or("none");
    let format = view.format.map(Format::as_str).unwrap_or("-");
    let unit = match view.key_type {
        Some(KeyType::String) => "bytes",
        _ => "elements",
    };
    writeln!(
        out,
        "# {} ({}, {} {}, encoding {}, ttl {}, format {})",
        view.key, key_type, view.size, unit, view.encoding, view.ttl, format
    )?;
    if !view.is_lossless() {
        eprintln!("warning: {}", view.error);
    }
    writeln!(out, "{}", view.content)?;
    Ok(())
}
