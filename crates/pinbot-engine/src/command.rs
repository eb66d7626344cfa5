//! The closed set of commands an agent pipeline may name.

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Like,
    Comment,
    Reply,
    Create,
}

/// Uppercase function name to command. `CREATE_VPIN` is the legacy name of `CREATE`.
const REGISTRY: &[(&str, CommandKind)] = &[
    ("LIKE", CommandKind::Like),
    ("COMMENT", CommandKind::Comment),
    ("REPLY", CommandKind::Reply),
    ("CREATE", CommandKind::Create),
    ("CREATE_VPIN", CommandKind::Create),
];

impl CommandKind {
    /// Case-insensitive exact lookup.
    pub fn parse(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        REGISTRY
            .iter()
            .find(|(registered, _)| *registered == upper)
            .map(|(_, kind)| *kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::Like => "LIKE",
            CommandKind::Comment => "COMMENT",
            CommandKind::Reply => "REPLY",
            CommandKind::Create => "CREATE",
        }
    }

    /// Creation runs without a target item and leaves the chained item alone.
    pub fn is_creation(&self) -> bool {
        matches!(self, CommandKind::Create)
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Every accepted function name, comma separated.
pub fn registered_names() -> String {
    REGISTRY
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve a declared function list. The first unknown name fails the whole list.
pub fn compile_pipeline(functions: &[String]) -> Result<Vec<CommandKind>, EngineError> {
    functions
        .iter()
        .map(|name| {
            CommandKind::parse(name).ok_or_else(|| EngineError::UnknownFunction(name.clone()))
        })
        .collect()
}
