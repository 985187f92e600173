//! Names shared by the front end that emits markers, the assertion library
//! and the instrumenter. They are part of the protocol: changing one of them
//! breaks modules produced by the other parties.

use const_format::concatcp;

use crate::annotation::Uid;

/// The module-level table of `annotate` attributes on functions and globals.
pub const GLOBAL_ANNOTATIONS: &str = "llvm.global.annotations";
pub const GLOBAL_ANNOTATIONS_SECTION: &str = "llvm.metadata";

/// Marker emitted for a variable declaration (and parameters).
pub const MARKER_VAR_DECLARED: &str = "llvm.var.annotation";
/// Marker emitted after an assignment or a call whose result is assigned.
pub const MARKER_VAR_ASSIGNED: &str = "llvm.var.assign.annotation";

pub const STATE_SUFFIX: &str = ".state";
pub const ASSERTIONS_PREFIX: &str = "assertions.";
pub const PROPS_SUFFIX: &str = ".props";
pub const PROP_SUFFIX: &str = ".prop";

pub const STRUCT_PREFIX: &str = "struct.";
pub const STATE_TYPE_SUFFIX: &str = "_state";
pub const STATE_DEFAULT_SUFFIX: &str = concatcp!(STATE_TYPE_SUFFIX, "_default");

pub const ROUTINE_INIT_PREFIX: &str = "__init_";
pub const ROUTINE_UPDATE_PREFIX: &str = "__update_";
pub const ROUTINE_ALLOC_PREFIX: &str = "__alloc_";

/// Declared by programs that want to reset the states of return-value
/// assertions; defined by the instrumenter.
pub const MODULE_INITIALIZER: &str = "InitializeAllAssertions";

/// `assertions.<uid>.state`: hidden parameters and local state slots.
pub fn state_name(uid: Uid) -> String {
    format!("{ASSERTIONS_PREFIX}{uid}{STATE_SUFFIX}")
}

/// `<function>.assertions.<uid>.state`: module-scope state of a return-value
/// assertion.
pub fn global_state_name(function: &str, uid: Uid) -> String {
    format!("{function}.{}", state_name(uid))
}

pub fn props_name(function: &str, uid: Uid) -> String {
    format!("{function}.{ASSERTIONS_PREFIX}{uid}{PROPS_SUFFIX}")
}

pub fn prop_name(function: &str, uid: Uid) -> String {
    format!("{function}.{ASSERTIONS_PREFIX}{uid}{PROP_SUFFIX}")
}

pub fn state_type_name(kind: &str) -> String {
    format!("{STRUCT_PREFIX}{kind}{STATE_TYPE_SUFFIX}")
}

pub fn state_default_name(kind: &str) -> String {
    format!("{kind}{STATE_DEFAULT_SUFFIX}")
}

pub fn init_routine_name(kind: &str) -> String {
    format!("{ROUTINE_INIT_PREFIX}{kind}")
}

pub fn update_routine_name(kind: &str) -> String {
    format!("{ROUTINE_UPDATE_PREFIX}{kind}")
}

pub fn alloc_routine_name(kind: &str) -> String {
    format!("{ROUTINE_ALLOC_PREFIX}{kind}")
}

/// Recovers the uid from a name produced by [`state_name`].
pub fn uid_of_state_name(name: &str) -> Option<Uid> {
    name.strip_prefix(ASSERTIONS_PREFIX)?
        .strip_suffix(STATE_SUFFIX)?
        .parse()
        .ok()
        .map(Uid)
}
