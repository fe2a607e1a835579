//! PG-003: Recipe file parsing and part validation (Configuration Loader).
//!
//! Loading a part is pure: option strings in, [`RecipeConfig`] out. Paths
//! are made absolute by joining onto the recipe file's directory; nothing
//! touches the filesystem here.

use super::cmdline;
use super::codegen;
use super::error::{RecipeError, Result};
use super::types::*;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Prefix of options copied into `postgresql.local.conf`.
pub const CONFIG_PREFIX: &str = "config.";

const KNOWN_OPTIONS: &[&str] = &[
    "recipe",
    "bin",
    "initdb",
    "pgdata",
    "port",
    "cmds",
    "socket_dir",
    "bin-directory",
    "location",
];

/// Inputs a part is resolved against.
#[derive(Debug, Clone)]
pub struct LoadContext {
    /// Directory relative paths are resolved against (absolute)
    pub base_dir: PathBuf,

    pub buildout: BuildoutSettings,
}

impl LoadContext {
    pub fn new(base_dir: impl Into<PathBuf>, buildout: BuildoutSettings) -> Self {
        Self {
            base_dir: base_dir.into(),
            buildout,
        }
    }

    fn absolute(&self, value: &str) -> PathBuf {
        let p = Path::new(value);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }
}

/// Parse a recipe file from disk.
pub fn parse_recipe_file(path: &Path) -> Result<RecipeFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| RecipeError::io(format!("failed to read {}", path.display()), e))?;
    parse_recipe(&content).map_err(|message| RecipeError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Parse a recipe file from a string.
pub fn parse_recipe(yaml: &str) -> std::result::Result<RecipeFile, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Convert raw part options to strings, rejecting non-scalar values.
pub fn option_strings(name: &str, raw: &PartOptions) -> Result<indexmap::IndexMap<String, String>> {
    raw.iter()
        .map(|(key, value)| {
            yaml_scalar_to_string(value)
                .map(|s| (key.clone(), s))
                .ok_or_else(|| RecipeError::config(name, key, "value must be a scalar"))
        })
        .collect()
}

/// Load every part of a recipe file, in declared order.
pub fn load_parts(file: &RecipeFile, base_dir: &Path) -> Result<Vec<RecipeConfig>> {
    let ctx = LoadContext::new(base_dir, file.buildout.clone());
    let parts = file
        .parts
        .iter()
        .map(|(name, raw)| load_part(name, &option_strings(name, raw)?, &ctx))
        .collect::<Result<Vec<_>>>()?;
    check_collisions(&parts)?;
    Ok(parts)
}

/// Two parts must never write the same script or share a location: each
/// would overwrite the other's scripts and install lock.
fn check_collisions(parts: &[RecipeConfig]) -> Result<()> {
    let mut scripts: HashMap<PathBuf, &str> = HashMap::new();
    let mut locations: HashMap<&Path, &str> = HashMap::new();
    for cfg in parts {
        if let Some(other) = locations.insert(&cfg.location, &cfg.name) {
            return Err(RecipeError::config(
                &cfg.name,
                "location",
                format!("{} is also used by part '{}'", cfg.location.display(), other),
            ));
        }
        let planned = codegen::script_plan(cfg)
            .into_iter()
            .filter(|(_, kind)| !kind.needs_pgdata() || cfg.pgdata.is_some());
        for (name, _) in planned {
            let path = cfg.bin_directory.join(&name);
            if let Some(other) = scripts.get(&path) {
                return Err(RecipeError::config(
                    &cfg.name,
                    "bin-directory",
                    format!(
                        "script {} is also generated by part '{}'; give each part its own bin-directory",
                        path.display(),
                        other
                    ),
                ));
            }
            scripts.insert(path, &cfg.name);
        }
    }
    Ok(())
}

/// Validate one part's options into a [`RecipeConfig`].
pub fn load_part(
    name: &str,
    options: &indexmap::IndexMap<String, String>,
    ctx: &LoadContext,
) -> Result<RecipeConfig> {
    for key in options.keys() {
        if !KNOWN_OPTIONS.contains(&key.as_str()) && !key.starts_with(CONFIG_PREFIX) {
            tracing::warn!(part = name, option = %key, "ignoring unknown option");
        }
    }

    let get = |key: &str| {
        options
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    };

    let bin = get("bin").map(|v| ctx.absolute(v));
    let pgdata = get("pgdata").map(|v| ctx.absolute(v));

    let port_explicit = get("port").is_some();
    let port = match get("port") {
        Some(v) => parse_port(v).map_err(|m| RecipeError::config(name, "port", m))?,
        None => DEFAULT_PORT,
    };

    let initdb = parse_initdb(get("initdb"), pgdata.as_deref())
        .map_err(|m| RecipeError::config(name, "initdb", m))?;
    if initdb.is_enabled() && pgdata.is_none() {
        return Err(RecipeError::config(
            name,
            "pgdata",
            "required when initdb is enabled",
        ));
    }

    let cmds = match options.get("cmds") {
        Some(v) => cmdline::parse_commands(v).map_err(|m| RecipeError::config(name, "cmds", m))?,
        None => Vec::new(),
    };
    if !cmds.is_empty() && !initdb.is_enabled() {
        tracing::debug!(part = name, "cmds only run right after initdb; initdb is disabled");
    }

    let socket_dir = get("socket_dir").map(|v| ctx.absolute(v)).or_else(|| pgdata.clone());

    let bin_directory = ctx.absolute(
        get("bin-directory").unwrap_or(ctx.buildout.bin_directory.as_str()),
    );
    let location = match get("location") {
        Some(v) => ctx.absolute(v),
        None => ctx.absolute(&ctx.buildout.parts_directory).join(name),
    };

    let socket_option = if get("socket_dir").is_some() { "socket_dir" } else { "pgdata" };
    let server_settings = server_settings(
        name,
        options,
        socket_dir.as_deref().map(|dir| (dir, socket_option)),
        port_explicit.then_some(port),
    )?;

    Ok(RecipeConfig {
        name: name.to_string(),
        bin,
        initdb,
        pgdata,
        port,
        socket_dir,
        bin_directory,
        location,
        cmds,
        server_settings,
    })
}

/// Parse a TCP port (1..=65535).
pub fn parse_port(value: &str) -> std::result::Result<u16, String> {
    let n: u32 = value
        .parse()
        .map_err(|_| format!("'{}' is not an integer", value))?;
    match u16::try_from(n) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(format!("{} is outside 1..=65535", n)),
    }
}

/// Interpret the `initdb` option: a boolean, or a custom argument string.
fn parse_initdb(value: Option<&str>, pgdata: Option<&Path>) -> std::result::Result<InitdbMode, String> {
    let Some(value) = value else {
        return Ok(InitdbMode::Disabled);
    };
    match value.to_ascii_lowercase().as_str() {
        "false" | "no" | "off" | "0" => Ok(InitdbMode::Disabled),
        "true" | "yes" | "on" | "1" => Ok(InitdbMode::Enabled(match pgdata {
            Some(p) => default_initdb_args(p),
            None => Vec::new(),
        })),
        _ => cmdline::split_words(value).map(InitdbMode::Enabled),
    }
}

/// Build the sorted server settings: socket defaults, explicit port, then
/// `config.*` overrides. Every setting becomes one `name = value` line, so
/// names are plain identifiers and values stay on one line.
fn server_settings(
    name: &str,
    options: &indexmap::IndexMap<String, String>,
    socket: Option<(&Path, &str)>,
    explicit_port: Option<u16>,
) -> Result<BTreeMap<String, String>> {
    let mut settings = BTreeMap::new();
    if let Some((dir, option)) = socket {
        let dir = dir.display().to_string();
        if dir.contains(['\'', '\n', '\r']) {
            return Err(RecipeError::config(
                name,
                option,
                "socket directory must not contain quotes or line breaks",
            ));
        }
        settings.insert("unix_socket_directories".to_string(), format!("'{}'", dir));
    }
    settings.insert("unix_socket_permissions".to_string(), "0700".to_string());
    settings.insert("listen_addresses".to_string(), "''".to_string());
    if let Some(port) = explicit_port {
        settings.insert("port".to_string(), port.to_string());
    }
    for (key, value) in options {
        let Some(setting) = key.strip_prefix(CONFIG_PREFIX) else {
            continue;
        };
        if setting.is_empty() {
            continue;
        }
        if !setting
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.'))
        {
            return Err(RecipeError::config(name, key, "not a valid setting name"));
        }
        if value.contains(['\n', '\r']) {
            return Err(RecipeError::config(name, key, "value must be a single line"));
        }
        settings.insert(setting.to_string(), value.clone());
    }
    Ok(settings)
}
