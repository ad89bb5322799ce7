//! Region flags.
//!
//! A flag is a named, typed policy attribute. Values are a closed set of
//! tagged variants; each flag definition carries the parser that turns
//! operator input into its value type, the default used when no region
//! sets it, and the rule used to combine values from overlapping regions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::geometry::BlockPos;
use crate::subject::{DomainSet, Principal};

/// Allow/deny state used by permission-like flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Allow,
    Deny,
}

impl State {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "allow" => Some(State::Allow),
            "deny" => Some(State::Deny),
            _ => None,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Allow => write!(f, "allow"),
            State::Deny => write!(f, "deny"),
        }
    }
}

/// The value type a flag accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    State,
    Boolean,
    Integer,
    Double,
    Text,
    StringSet,
    SubjectSet,
    Location,
}

/// A typed flag value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum FlagValue {
    State(State),
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Text(String),
    StringSet(BTreeSet<String>),
    SubjectSet(DomainSet),
    Location(BlockPos),
}

impl FlagValue {
    pub fn kind(&self) -> FlagKind {
        match self {
            FlagValue::State(_) => FlagKind::State,
            FlagValue::Boolean(_) => FlagKind::Boolean,
            FlagValue::Integer(_) => FlagKind::Integer,
            FlagValue::Double(_) => FlagKind::Double,
            FlagValue::Text(_) => FlagKind::Text,
            FlagValue::StringSet(_) => FlagKind::StringSet,
            FlagValue::SubjectSet(_) => FlagKind::SubjectSet,
            FlagValue::Location(_) => FlagKind::Location,
        }
    }

    pub fn as_state(&self) -> Option<State> {
        match self {
            FlagValue::State(state) => Some(*state),
            _ => None,
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::State(s) => write!(f, "{}", s),
            FlagValue::Boolean(b) => write!(f, "{}", b),
            FlagValue::Integer(i) => write!(f, "{}", i),
            FlagValue::Double(d) => write!(f, "{}", d),
            FlagValue::Text(t) => write!(f, "{}", t),
            FlagValue::StringSet(set) => {
                let items: Vec<&str> = set.iter().map(String::as_str).collect();
                write!(f, "{}", items.join(", "))
            }
            FlagValue::SubjectSet(set) => {
                let items: Vec<String> = set.iter().map(|p| p.to_string()).collect();
                write!(f, "{}", items.join(", "))
            }
            FlagValue::Location(pos) => write!(f, "{}", pos),
        }
    }
}

/// How values from several covering regions combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Combine {
    /// The highest-priority region with a value decides
    #[default]
    HighestWins,
    /// Every covering region is consulted and any deny wins
    DenyOverrides,
}

/// How a subject relates to a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    Owner,
    Member,
    NonMember,
}

/// Who a flag value applies to within a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionGroup {
    #[default]
    All,
    Members,
    Owners,
    NonMembers,
    NonOwners,
    None,
}

impl RegionGroup {
    pub fn contains(self, association: Association) -> bool {
        match self {
            RegionGroup::All => true,
            RegionGroup::Members => association != Association::NonMember,
            RegionGroup::Owners => association == Association::Owner,
            RegionGroup::NonMembers => association == Association::NonMember,
            RegionGroup::NonOwners => association != Association::Owner,
            RegionGroup::None => false,
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "all" | "everyone" => Some(RegionGroup::All),
            "members" | "member" => Some(RegionGroup::Members),
            "owners" | "owner" => Some(RegionGroup::Owners),
            "non_members" | "nonmembers" => Some(RegionGroup::NonMembers),
            "non_owners" | "nonowners" => Some(RegionGroup::NonOwners),
            "none" | "nobody" => Some(RegionGroup::None),
            _ => None,
        }
    }
}

/// Errors turning operator input into a flag value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlagParseError {
    /// Input was not `allow` or `deny`
    #[error("expected 'allow' or 'deny', got '{0}'")]
    InvalidState(String),

    /// Input was not a recognised boolean
    #[error("expected true/false, got '{0}'")]
    InvalidBoolean(String),

    /// Input was not a number
    #[error("not a number: '{0}'")]
    InvalidNumber(String),

    /// A set flag was given no entries
    #[error("at least one entry is required")]
    EmptySet,

    /// A set entry could not be read as a player or group
    #[error("not a player or group: '{0}'")]
    InvalidPrincipal(String),

    /// Input was not `here` or `x,y,z`
    #[error("expected 'here' or 'x,y,z', got '{0}'")]
    InvalidLocation(String),

    /// `here` was used without a sender position
    #[error("'here' needs a sender with a position")]
    NoSenderPosition,
}

/// Context available while parsing flag input.
#[derive(Debug, Clone, Default)]
pub struct FlagContext {
    /// Where the sender stands, for location flags
    pub sender_position: Option<BlockPos>,
}

impl FlagContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: BlockPos) -> Self {
        self.sender_position = Some(position);
        self
    }
}

/// Definition of a flag: name, type, default and combination rule.
#[derive(Debug, Clone, PartialEq)]
pub struct FlagDef {
    pub name: String,
    pub kind: FlagKind,
    pub default: Option<FlagValue>,
    pub combine: Combine,
    /// Group used when a region sets the flag without naming one
    pub default_group: RegionGroup,
}

impl FlagDef {
    pub fn new(name: impl AsRef<str>, kind: FlagKind) -> Self {
        Self {
            name: name.as_ref().to_ascii_lowercase(),
            kind,
            default: None,
            combine: Combine::HighestWins,
            default_group: RegionGroup::All,
        }
    }

    pub fn state(name: impl AsRef<str>) -> Self {
        Self::new(name, FlagKind::State)
    }

    pub fn with_default(mut self, value: FlagValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn deny_overrides(mut self) -> Self {
        self.combine = Combine::DenyOverrides;
        self
    }

    pub fn with_default_group(mut self, group: RegionGroup) -> Self {
        self.default_group = group;
        self
    }

    /// Parses raw operator input into this flag's value type.
    pub fn parse_input(&self, raw: &str, ctx: &FlagContext) -> Result<FlagValue, FlagParseError> {
        let input = raw.trim();
        match self.kind {
            FlagKind::State => State::parse(input)
                .map(FlagValue::State)
                .ok_or_else(|| FlagParseError::InvalidState(input.to_string())),
            FlagKind::Boolean => match input.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "allow" => Ok(FlagValue::Boolean(true)),
                "false" | "no" | "off" | "deny" => Ok(FlagValue::Boolean(false)),
                _ => Err(FlagParseError::InvalidBoolean(input.to_string())),
            },
            FlagKind::Integer => input
                .parse::<i64>()
                .map(FlagValue::Integer)
                .map_err(|_| FlagParseError::InvalidNumber(input.to_string())),
            FlagKind::Double => match input.parse::<f64>() {
                Ok(d) if d.is_finite() => Ok(FlagValue::Double(d)),
                _ => Err(FlagParseError::InvalidNumber(input.to_string())),
            },
            FlagKind::Text => Ok(FlagValue::Text(raw.replace("\\n", "\n"))),
            FlagKind::StringSet => {
                let items: BTreeSet<String> = split_list(input)
                    .map(|item| item.to_ascii_lowercase())
                    .collect();
                if items.is_empty() {
                    return Err(FlagParseError::EmptySet);
                }
                Ok(FlagValue::StringSet(items))
            }
            FlagKind::SubjectSet => {
                let mut set = DomainSet::new();
                for token in split_list(input) {
                    let principal = Principal::parse(token)
                        .ok_or_else(|| FlagParseError::InvalidPrincipal(token.to_string()))?;
                    set.add(principal);
                }
                if set.is_empty() {
                    return Err(FlagParseError::EmptySet);
                }
                Ok(FlagValue::SubjectSet(set))
            }
            FlagKind::Location => parse_location(input, ctx),
        }
    }
}

fn split_list(input: &str) -> impl Iterator<Item = &str> {
    input.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_location(input: &str, ctx: &FlagContext) -> Result<FlagValue, FlagParseError> {
    if input.eq_ignore_ascii_case("here") {
        return ctx
            .sender_position
            .map(FlagValue::Location)
            .ok_or(FlagParseError::NoSenderPosition);
    }

    let coords: Vec<i32> = input
        .split(',')
        .map(|c| c.trim().parse::<i32>())
        .collect::<Result<_, _>>()
        .map_err(|_| FlagParseError::InvalidLocation(input.to_string()))?;

    match coords.as_slice() {
        [x, y, z] => Ok(FlagValue::Location(BlockPos::new(*x, *y, *z))),
        _ => Err(FlagParseError::InvalidLocation(input.to_string())),
    }
}

/// Maps flag names to their definitions.
#[derive(Debug, Clone, Default)]
pub struct FlagRegistry {
    flags: BTreeMap<String, FlagDef>,
}

impl FlagRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in flags.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for def in builtin_flags() {
            registry.register(def);
        }
        registry
    }

    /// Registers a flag. Returns false if the name is already taken.
    pub fn register(&mut self, def: FlagDef) -> bool {
        if self.flags.contains_key(&def.name) {
            return false;
        }
        self.flags.insert(def.name.clone(), def);
        true
    }

    /// Looks up a flag by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&FlagDef> {
        self.flags.get(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlagDef> {
        self.flags.values()
    }
}

/// Built-in flag definitions.
pub fn builtin_flags() -> Vec<FlagDef> {
    vec![
        FlagDef::state("build"),
        FlagDef::state("passthrough"),
        FlagDef::state("block-break"),
        FlagDef::state("block-place"),
        FlagDef::state("use"),
        FlagDef::state("interact"),
        FlagDef::state("chest-access"),
        FlagDef::state("pvp").deny_overrides(),
        FlagDef::state("tnt").deny_overrides(),
        FlagDef::state("entry").with_default_group(RegionGroup::NonMembers),
        FlagDef::state("exit").with_default_group(RegionGroup::NonMembers),
        FlagDef::new("greeting", FlagKind::Text),
        FlagDef::new("farewell", FlagKind::Text),
        FlagDef::new("notify-enter", FlagKind::Boolean).with_default(FlagValue::Boolean(false)),
        FlagDef::new("heal-amount", FlagKind::Integer),
        FlagDef::new("heal-delay", FlagKind::Integer),
        FlagDef::new("heal-max-health", FlagKind::Double),
        FlagDef::new("blocked-cmds", FlagKind::StringSet),
        FlagDef::new("allowed-cmds", FlagKind::StringSet),
        FlagDef::new("deny-spawn", FlagKind::StringSet),
        FlagDef::new("teleport", FlagKind::Location),
    ]
}
