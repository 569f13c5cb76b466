// `/kv` slash command: parsing and dispatch
use std::fmt::Write;
use std::sync::Arc;

use crate::api::middleware::AppError;
use crate::models::CommandResponse;
use crate::services::aggregator::{group_by_owner, CrossTenantReader};
use crate::services::kv_store::KvApi;

/// Subcommands whose arguments were missing or malformed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    Set,
    Get,
    Delete,
}

impl Usage {
    pub fn text(&self, trigger: &str) -> String {
        match self {
            Usage::Set => format!("Usage: `/{} set <key> <value>`", trigger),
            Usage::Get => format!("Usage: `/{t} get <key>` or `/{t} get <pluginid:key>`", t = trigger),
            Usage::Delete => format!("Usage: `/{} delete <key>`", trigger),
        }
    }
}

pub fn help_text(trigger: &str) -> String {
    format!(
        "### KV Store Management Commands

**Available Commands:**
- `/{t} set <key> <value>` - Set a key-value pair
- `/{t} get <key>` - Get the value for a key
- `/{t} get <pluginid:key>` - Get the value for a key from another plugin
- `/{t} delete <key>` - Delete a key-value pair
- `/{t} list` - List all keys in this plugin's store
- `/{t} list --all` - List all keys from all plugins
- `/{t} deleteall` - Delete all key-value pairs
- `/{t} help` - Show this help message

**Examples:**
- `/{t} set mykey Hello World`
- `/{t} get mykey`
- `/{t} get com.manybugs.mattermost-plugin-feed:some-key`
- `/{t} list --all`
- `/{t} delete mykey`
",
        t = trigger
    )
}

/// A parsed `/kv` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvCommand {
    Set { key: String, value: String },
    Get { key: String },
    /// `get owner:key`, reads another owner's namespace
    GetForeign { owner_id: String, key: String },
    Delete { key: String },
    List { all: bool },
    DeleteAll,
    Help,
    /// Subcommand recognised but arguments missing
    Usage(Usage),
    Unknown(String),
}

impl KvCommand {
    /// Parse a raw command line such as `/kv set greeting Hello World`.
    ///
    /// The first token must be the trigger, with or without a leading `/`.
    /// A bare trigger is treated as `help`.
    pub fn parse(trigger: &str, line: &str) -> Result<Self, AppError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        match tokens.first() {
            Some(first) if first.trim_start_matches('/') == trigger => {}
            Some(first) => {
                return Err(AppError::Validation(format!(
                    "Unknown command: {} (expected /{})",
                    first, trigger
                )))
            }
            None => return Err(AppError::Validation("Empty command".to_string())),
        }

        let Some(action) = tokens.get(1) else {
            return Ok(KvCommand::Help);
        };
        let args = &tokens[2..];

        let command = match *action {
            "set" if args.len() >= 2 => KvCommand::Set {
                key: args[0].to_string(),
                value: args[1..].join(" "),
            },
            "set" => KvCommand::Usage(Usage::Set),
            "get" => match args.first() {
                Some(arg) => match arg.split_once(':') {
                    Some((owner, key)) if !owner.is_empty() && !key.is_empty() => {
                        KvCommand::GetForeign {
                            owner_id: owner.to_string(),
                            key: key.to_string(),
                        }
                    }
                    Some(_) => KvCommand::Usage(Usage::Get),
                    None => KvCommand::Get {
                        key: arg.to_string(),
                    },
                },
                None => KvCommand::Usage(Usage::Get),
            },
            "delete" => match args.first() {
                Some(key) => KvCommand::Delete {
                    key: key.to_string(),
                },
                None => KvCommand::Usage(Usage::Delete),
            },
            "list" => KvCommand::List {
                all: args.contains(&"--all"),
            },
            "deleteall" => KvCommand::DeleteAll,
            "help" => KvCommand::Help,
            other => KvCommand::Unknown(other.to_string()),
        };

        Ok(command)
    }
}

/// Runs `/kv` commands against an owner-scoped store, with optional
/// cross-tenant reads
pub struct CommandService {
    trigger: String,
    list_page_size: usize,
    reader: Option<Arc<CrossTenantReader>>,
}

impl CommandService {
    pub fn new(trigger: impl Into<String>, list_page_size: usize) -> Self {
        Self {
            trigger: trigger.into(),
            list_page_size,
            reader: None,
        }
    }

    /// Grant cross-tenant reads (`get owner:key`, `list --all`)
    pub fn with_reader(mut self, reader: Arc<CrossTenantReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    fn reader(&self) -> Result<&CrossTenantReader, AppError> {
        self.reader
            .as_deref()
            .ok_or_else(|| AppError::Forbidden("Cross-tenant access is not enabled".to_string()))
    }

    /// Parse and run one command line.
    ///
    /// Only a malformed invocation is an error; failures of the operation
    /// itself are reported in the response text.
    pub async fn execute(&self, kv: &dyn KvApi, line: &str) -> Result<CommandResponse, AppError> {
        let command = KvCommand::parse(&self.trigger, line)?;
        tracing::info!("Running /{} command for {}: {:?}", self.trigger, kv.owner_id(), command);
        Ok(self.dispatch(kv, command).await)
    }

    pub async fn dispatch(&self, kv: &dyn KvApi, command: KvCommand) -> CommandResponse {
        let text = match command {
            KvCommand::Set { key, value } => match kv.set(&key, value.as_bytes()).await {
                Ok(()) => format!("✓ Key `{}` set successfully", key),
                Err(e) => format!("Error setting key: {}", e),
            },
            KvCommand::Get { key } => match kv.get(&key).await {
                Ok(Some(value)) => format!(
                    "**Key:** `{}`\n**Value:** {}",
                    key,
                    String::from_utf8_lossy(&value)
                ),
                Ok(None) => format!("Key `{}` not found", key),
                Err(e) => format!("Error getting key: {}", e),
            },
            KvCommand::GetForeign { owner_id, key } => self.get_foreign(&owner_id, &key).await,
            KvCommand::Delete { key } => match kv.delete(&key).await {
                Ok(()) => format!("✓ Key `{}` deleted successfully", key),
                Err(e) => format!("Error deleting key: {}", e),
            },
            KvCommand::List { all: false } => self.list_own(kv).await,
            KvCommand::List { all: true } => self.list_all().await,
            KvCommand::DeleteAll => match kv.delete_all().await {
                Ok(()) => "✓ All keys deleted successfully".to_string(),
                Err(e) => format!("Error deleting all keys: {}", e),
            },
            KvCommand::Help => help_text(&self.trigger),
            KvCommand::Usage(usage) => usage.text(&self.trigger),
            KvCommand::Unknown(action) => format!(
                "Unknown action: {}\nUse `/{} help` for usage information.",
                action, self.trigger
            ),
        };

        CommandResponse::ephemeral(text)
    }

    async fn get_foreign(&self, owner_id: &str, key: &str) -> String {
        let result = match self.reader() {
            Ok(reader) => reader.lookup(owner_id, key).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(entry) => format!(
                "**Plugin:** `{}`\n**Key:** `{}`\n**Value:** {}",
                entry.owner_id,
                entry.key,
                entry.value_text().unwrap_or_default()
            ),
            Err(e) => format!("Error getting key from plugin `{}`: {}", owner_id, e),
        }
    }

    async fn list_own(&self, kv: &dyn KvApi) -> String {
        let keys = match kv.list(0, self.list_page_size).await {
            Ok(keys) => keys,
            Err(e) => return format!("Error listing keys: {}", e),
        };

        if keys.is_empty() {
            return "No keys found in the KV store".to_string();
        }

        let mut text = format!("**KV Store Keys** (showing {} keys):\n", keys.len());
        for (i, key) in keys.iter().enumerate() {
            let _ = writeln!(text, "{}. `{}`", i + 1, key);
        }
        text
    }

    async fn list_all(&self) -> String {
        let result = match self.reader() {
            Ok(reader) => reader.list_all().await,
            Err(e) => Err(e),
        };
        let entries = match result {
            Ok(entries) => entries,
            Err(e) => return format!("Error listing keys from all plugins: {}", e),
        };

        if entries.is_empty() {
            return "No keys found in any plugin's KV store".to_string();
        }

        let groups = group_by_owner(&entries);
        let mut text = format!(
            "**All Plugin KV Store Keys** (found {} keys across {} plugins):\n\n",
            entries.len(),
            groups.len()
        );
        for group in &groups {
            let _ = writeln!(text, "**Plugin:** `{}` ({} keys)", group.owner_id, group.keys.len());
            for (i, key) in group.keys.iter().enumerate() {
                let _ = writeln!(text, "  {}. `{}`", i + 1, key);
            }
            text.push('\n');
        }
        text
    }
}
