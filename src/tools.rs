//! Tool registry: the operations an LLM agent (or an admin typing
//! `/tool_name args…`) can invoke, each with a declared argument schema.

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::event::ToolContext;
use crate::moderation::{add_to_blacklist, kick, list_blacklist, mute, remove_from_blacklist};
use crate::state::State;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tool {
    SetGroupBan,
    SetGroupKick,
    AddToBlacklist,
    RemoveFromBlacklist,
    ListBlacklist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParamKind {
    String,
    Number,
}

impl ParamKind {
    fn json_type(self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
        }
    }
}

#[derive(Debug)]
pub(crate) struct ParamSpec {
    pub(crate) name: &'static str,
    pub(crate) kind: ParamKind,
    pub(crate) description: &'static str,
    pub(crate) required: bool,
}

#[derive(Debug)]
pub(crate) struct ToolSpec {
    pub(crate) name: &'static str,
    pub(crate) description: &'static str,
    /// Declaration order is also the positional order for chat commands.
    pub(crate) params: &'static [ParamSpec],
    pub(crate) tool: Tool,
}

const USER_ID_PARAM: ParamSpec = ParamSpec {
    name: "user_id",
    kind: ParamKind::String,
    description: "The ID of the target user",
    required: true,
};

const TOOL_SPECS: &[ToolSpec] = &[
    ToolSpec {
        name: "set_group_ban",
        description: "Mute a user in the group chat. The muted user will not be able to send \
                      messages during the mute period.",
        params: &[
            USER_ID_PARAM,
            ParamSpec {
                name: "duration",
                kind: ParamKind::Number,
                description: "The duration of the mute in seconds, must be a multiple of 60 \
                              (e.g., 60, 180). Set to 0 to unmute",
                required: true,
            },
        ],
        tool: Tool::SetGroupBan,
    },
    ToolSpec {
        name: "set_group_kick",
        description: "Kick a user from the group chat.",
        params: &[USER_ID_PARAM],
        tool: Tool::SetGroupKick,
    },
    ToolSpec {
        name: "add_to_blacklist",
        description: "Add a user to the blacklist. The bot ignores all messages from \
                      blacklisted users until the entry expires or is removed.",
        params: &[
            USER_ID_PARAM,
            ParamSpec {
                name: "duration",
                kind: ParamKind::Number,
                description: "How long the entry lasts in seconds. 0 or omitted means permanent",
                required: false,
            },
            ParamSpec {
                name: "reason",
                kind: ParamKind::String,
                description: "Why the user is being blacklisted",
                required: false,
            },
        ],
        tool: Tool::AddToBlacklist,
    },
    ToolSpec {
        name: "remove_from_blacklist",
        description: "Remove a user from the blacklist.",
        params: &[USER_ID_PARAM],
        tool: Tool::RemoveFromBlacklist,
    },
    ToolSpec {
        name: "list_blacklist",
        description: "List all blacklisted users with their reason and expiry.",
        params: &[],
        tool: Tool::ListBlacklist,
    },
];

impl ToolSpec {
    /// OpenAI-style function declaration.
    pub(crate) fn schema(&self) -> Value {
        let mut properties = Map::new();
        for p in self.params {
            properties.insert(
                p.name.to_string(),
                json!({"type": p.kind.json_type(), "description": p.description}),
            );
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

enum ArgValue {
    Str(String),
    Num(i64),
}

/// Arguments after validation against a tool's declared params.
struct BoundArgs(HashMap<&'static str, ArgValue>);

impl BoundArgs {
    fn str(&self, name: &str) -> &str {
        match self.0.get(name) {
            Some(ArgValue::Str(s)) => s,
            _ => "",
        }
    }

    fn num(&self, name: &str) -> i64 {
        match self.0.get(name) {
            Some(ArgValue::Num(n)) => *n,
            _ => 0,
        }
    }
}

fn string_arg(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number_arg(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Err carries the rejection message shown to the caller.
fn bind_args(spec: &ToolSpec, args: &Value) -> Result<BoundArgs, String> {
    let empty = Map::new();
    let obj = match args {
        Value::Object(obj) => obj,
        Value::Null => &empty,
        _ => return Err("Tool arguments must be a JSON object.".to_string()),
    };

    let mut bound = HashMap::new();
    for p in spec.params {
        let Some(raw) = obj.get(p.name).filter(|v| !v.is_null()) else {
            if p.required {
                return Err(format!("Missing required argument: {}", p.name));
            }
            continue;
        };
        let value = match p.kind {
            ParamKind::String => string_arg(raw).map(ArgValue::Str),
            ParamKind::Number => number_arg(raw).map(ArgValue::Num),
        };
        match value {
            Some(ArgValue::Str(s)) if s.is_empty() && p.required => {
                return Err(format!("Missing required argument: {}", p.name));
            }
            Some(v) => {
                bound.insert(p.name, v);
            }
            None => {
                return Err(format!(
                    "Invalid argument {}: expected a {}",
                    p.name,
                    p.kind.json_type()
                ));
            }
        }
    }
    Ok(BoundArgs(bound))
}

/// `[CQ:at,qq=12345]` mentions resolve to the mentioned id.
fn mention_or_token(token: &str) -> &str {
    token
        .strip_prefix("[CQ:at,qq=")
        .and_then(|rest| rest.split([',', ']']).next())
        .filter(|id| !id.is_empty())
        .unwrap_or(token)
}

fn next_token(rest: &str) -> (&str, &str) {
    match rest.split_once(char::is_whitespace) {
        Some((token, tail)) => (token, tail.trim_start()),
        None => (rest, ""),
    }
}

pub(crate) struct ToolRegistry {
    tools: BTreeMap<&'static str, &'static ToolSpec>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub(crate) fn new() -> Self {
        let tools = TOOL_SPECS.iter().map(|spec| (spec.name, spec)).collect();
        Self { tools }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&'static ToolSpec> {
        self.tools.get(name).copied()
    }

    pub(crate) fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    pub(crate) fn schemas(&self) -> Vec<Value> {
        self.tools.values().map(|spec| spec.schema()).collect()
    }

    /// Validate `args` against the named tool and run it. Validation and
    /// authorization problems come back as `Ok` rejection strings; platform
    /// failures are `Err`.
    pub(crate) async fn invoke(
        &self,
        state: &State,
        ctx: &ToolContext,
        name: &str,
        args: &Value,
    ) -> Result<String, AppError> {
        let Some(spec) = self.get(name) else {
            warn!(tool = name, "Unknown tool requested");
            return Ok(format!("Unknown tool: {name}"));
        };
        let args = match bind_args(spec, args) {
            Ok(a) => a,
            Err(msg) => {
                debug!(tool = name, "Rejected tool arguments: {msg}");
                return Ok(msg);
            }
        };
        debug!(tool = name, requester = %ctx.sender_id, "Invoking tool");

        match spec.tool {
            Tool::SetGroupBan => mute(state, ctx, args.str("user_id"), args.num("duration")).await,
            Tool::SetGroupKick => kick(state, ctx, args.str("user_id")).await,
            Tool::AddToBlacklist => Ok(add_to_blacklist(
                &state.store,
                args.str("user_id"),
                args.num("duration"),
                args.str("reason"),
                Utc::now(),
            )),
            Tool::RemoveFromBlacklist => Ok(remove_from_blacklist(&state.store, args.str("user_id"))),
            Tool::ListBlacklist => Ok(list_blacklist(&state.store, Utc::now())),
        }
    }

    /// Parse `/tool_name arg1 arg2 rest…` into a tool name and JSON args,
    /// filling params positionally. A trailing string param takes the rest
    /// of the line; user ids are always a single token.
    pub(crate) fn parse_command(&self, text: &str) -> Option<(&'static str, Value)> {
        let body = text.trim().strip_prefix('/')?;
        let (name, mut rest) = next_token(body);
        let spec = self.get(name)?;

        let mut args = Map::new();
        for (i, p) in spec.params.iter().enumerate() {
            if rest.is_empty() {
                break;
            }
            let takes_rest =
                i + 1 == spec.params.len() && p.kind == ParamKind::String && p.name != "user_id";
            let token = if takes_rest {
                std::mem::take(&mut rest)
            } else {
                let (token, tail) = next_token(rest);
                rest = tail;
                token
            };
            let value = match p.kind {
                ParamKind::Number => token
                    .parse::<i64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::from(token)),
                ParamKind::String if p.name == "user_id" => Value::from(mention_or_token(token)),
                ParamKind::String => Value::from(token),
            };
            args.insert(p.name.to_string(), value);
        }
        Some((spec.name, Value::Object(args)))
    }
}
