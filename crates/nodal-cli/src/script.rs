//! TOML request scripts.
//!
//! A script is a list of `[[request]]` tables, each naming an `op` and the
//! fields that op needs:
//!
//! ```toml
//! [[request]]
//! op = "put"
//! path = "/main/amp"
//! kind = "plugin"
//! plugin = "urn:example:amp"
//!
//! [[request]]
//! op = "set"
//! at_ms = 20
//! path = "/main/amp/gain"
//! predicate = "nodal:value"
//! value = 0.8
//! ```
//!
//! Values map to atoms by TOML type. Strings stay strings unless written as
//! `{ uri = "..." }` or `{ path = "/..." }`, and `"*"` in a `remove` table
//! is the wildcard.

use std::path::Path as FsPath;
use std::time::Duration;

use nodal_core::{Atom, InternalKind, ObjectKind, Path, PathError, Properties, Uri};
use nodal_engine::{Payload, PutMode};
use serde::Deserialize;
use thiserror::Error;

/// Errors decoding a request script.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The script file could not be read.
    #[error("failed to read script {path}: {source}")]
    Read {
        /// Script path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The script is not valid TOML or has an unexpected shape.
    #[error("failed to parse script: {0}")]
    Parse(#[from] toml::de::Error),

    /// A request names an op this decoder does not know.
    #[error("request {index}: unknown op '{op}'")]
    UnknownOp {
        /// Position in the script.
        index: usize,
        /// The op given.
        op: String,
    },

    /// A request lacks a field its op needs.
    #[error("request {index} ({op}): missing field '{field}'")]
    MissingField {
        /// Position in the script.
        index: usize,
        /// The request's op.
        op: String,
        /// The missing field.
        field: &'static str,
    },

    /// A path field is not a valid path.
    #[error("request {index}: {source}")]
    InvalidPath {
        /// Position in the script.
        index: usize,
        /// Underlying error.
        #[source]
        source: PathError,
    },

    /// A field has a value the decoder cannot use.
    #[error("request {index}: {reason}")]
    Invalid {
        /// Position in the script.
        index: usize,
        /// What was wrong.
        reason: String,
    },
}

/// One decoded request, not yet bound to a client.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Request id echoed in the response.
    pub id: i32,
    /// Offset from engine start at which the request executes.
    pub at: Duration,
    /// What to do.
    pub payload: Payload,
}

#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default, rename = "request")]
    requests: Vec<RawRequest>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRequest {
    op: String,
    id: Option<i32>,
    #[serde(default)]
    at_ms: u64,
    path: Option<String>,
    kind: Option<String>,
    internal: Option<String>,
    plugin: Option<String>,
    #[serde(default)]
    unique: bool,
    #[serde(default)]
    properties: toml::Table,
    #[serde(default)]
    remove: toml::Table,
    predicate: Option<String>,
    value: Option<toml::Value>,
    to: Option<String>,
    tail: Option<String>,
    head: Option<String>,
    graph: Option<String>,
}

/// Reads and decodes a script file.
pub fn load(path: impl AsRef<FsPath>) -> Result<Vec<Request>, DecodeError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| DecodeError::Read {
        path: path.display().to_string(),
        source,
    })?;
    decode(&contents)
}

/// Decodes a script. Requests without an `id` are numbered from 1 by
/// position.
pub fn decode(source: &str) -> Result<Vec<Request>, DecodeError> {
    let script: Script = toml::from_str(source)?;
    script
        .requests
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            let decoder = Decoder { index, raw: &raw };
            Ok(Request {
                id: raw.id.unwrap_or(index as i32 + 1),
                at: Duration::from_millis(raw.at_ms),
                payload: decoder.payload()?,
            })
        })
        .collect()
}

struct Decoder<'a> {
    index: usize,
    raw: &'a RawRequest,
}

impl Decoder<'_> {
    fn payload(&self) -> Result<Payload, DecodeError> {
        let raw = self.raw;
        let payload = match raw.op.as_str() {
            "put" => Payload::Put {
                path: self.path("path", raw.path.as_deref())?,
                kind: self.kind()?,
                properties: self.properties(&raw.properties, false)?,
                mode: if raw.unique {
                    PutMode::Unique
                } else {
                    PutMode::Create
                },
            },
            "delta" => Payload::Delta {
                subject: self.path("path", raw.path.as_deref())?,
                remove: self.properties(&raw.remove, true)?,
                add: self.properties(&raw.properties, false)?,
            },
            "set" => Payload::SetProperty {
                subject: self.path("path", raw.path.as_deref())?,
                predicate: Uri::new(self.required("predicate", raw.predicate.as_deref())?),
                value: self.atom(
                    raw.value
                        .as_ref()
                        .ok_or_else(|| self.missing("value"))?,
                    false,
                )?,
            },
            "move" => Payload::Move {
                old: self.path("path", raw.path.as_deref())?,
                new: self.path("to", raw.to.as_deref())?,
            },
            "delete" => Payload::Delete {
                path: self.path("path", raw.path.as_deref())?,
            },
            "connect" => Payload::Connect {
                tail: self.path("tail", raw.tail.as_deref())?,
                head: self.path("head", raw.head.as_deref())?,
            },
            "disconnect" => Payload::Disconnect {
                tail: self.path("tail", raw.tail.as_deref())?,
                head: self.path("head", raw.head.as_deref())?,
            },
            "disconnect_all" => Payload::DisconnectAll {
                graph: self.path("graph", raw.graph.as_deref())?,
                path: self.path("path", raw.path.as_deref())?,
            },
            "learn" => Payload::Learn {
                path: self.path("path", raw.path.as_deref())?,
            },
            "get" => Payload::Get {
                subject: self.path("path", raw.path.as_deref())?,
            },
            "register" => Payload::RegisterClient,
            "unregister" => Payload::UnregisterClient,
            other => {
                return Err(DecodeError::UnknownOp {
                    index: self.index,
                    op: other.to_string(),
                });
            }
        };
        Ok(payload)
    }

    fn missing(&self, field: &'static str) -> DecodeError {
        DecodeError::MissingField {
            index: self.index,
            op: self.raw.op.clone(),
            field,
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::Invalid {
            index: self.index,
            reason: reason.into(),
        }
    }

    fn required<'s>(
        &self,
        field: &'static str,
        value: Option<&'s str>,
    ) -> Result<&'s str, DecodeError> {
        value.ok_or_else(|| self.missing(field))
    }

    fn path(&self, field: &'static str, value: Option<&str>) -> Result<Path, DecodeError> {
        Path::new(self.required(field, value)?).map_err(|source| DecodeError::InvalidPath {
            index: self.index,
            source,
        })
    }

    fn kind(&self) -> Result<ObjectKind, DecodeError> {
        let raw = self.raw;
        match self.required("kind", raw.kind.as_deref())? {
            "graph" => Ok(ObjectKind::Graph),
            "input" => Ok(ObjectKind::input()),
            "output" => Ok(ObjectKind::output()),
            "plugin" => Ok(ObjectKind::plugin(Uri::new(
                self.required("plugin", raw.plugin.as_deref())?,
            ))),
            "internal" => {
                let internal = match self.required("internal", raw.internal.as_deref())? {
                    "control" => InternalKind::Control,
                    "note" => InternalKind::Note,
                    "trigger" => InternalKind::Trigger,
                    "time" => InternalKind::Time,
                    other => {
                        return Err(self.invalid(format!("unknown internal block '{other}'")));
                    }
                };
                Ok(ObjectKind::internal(internal))
            }
            other => Err(self.invalid(format!("unknown kind '{other}'"))),
        }
    }

    fn properties(&self, table: &toml::Table, removal: bool) -> Result<Properties, DecodeError> {
        let mut properties = Properties::new();
        for (predicate, value) in table {
            match value {
                toml::Value::Array(values) => {
                    for value in values {
                        properties.insert(predicate.as_str(), self.atom(value, removal)?);
                    }
                }
                value => properties.insert(predicate.as_str(), self.atom(value, removal)?),
            }
        }
        Ok(properties)
    }

    fn atom(&self, value: &toml::Value, removal: bool) -> Result<Atom, DecodeError> {
        match value {
            toml::Value::Boolean(v) => Ok(Atom::Bool(*v)),
            toml::Value::Integer(v) => i32::try_from(*v)
                .map(Atom::Int)
                .map_err(|_| self.invalid(format!("integer {v} does not fit in 32 bits"))),
            toml::Value::Float(v) => Ok(Atom::Float(*v as f32)),
            toml::Value::String(s) if removal && s == "*" => Ok(Atom::wildcard()),
            toml::Value::String(s) => Ok(Atom::String(s.clone())),
            toml::Value::Table(table) => match (table.get("uri"), table.get("path")) {
                (Some(toml::Value::String(uri)), None) => Ok(Atom::Uri(Uri::new(uri.as_str()))),
                (None, Some(toml::Value::String(path))) => Path::new(path.as_str())
                    .map(Atom::Path)
                    .map_err(|source| DecodeError::InvalidPath {
                        index: self.index,
                        source,
                    }),
                _ => Err(self.invalid("value tables take exactly one of 'uri' or 'path'")),
            },
            other => Err(self.invalid(format!("unsupported value type {}", other.type_str()))),
        }
    }
}
