//! # Innate Primitives
//!
//! Hardcoded noun type names, method names and limits.
//!
//! These are compiled into the binary and immutable at runtime. The built-in
//! mail catalog and the default helper table refer to types by these names.

// =============================================================================
// VALUE TYPE NAMES
// =============================================================================

/// Boolean value type.
pub const NOUN_BOOLEAN: &str = "boolean";

/// Numeric value type.
pub const NOUN_NUMBER: &str = "number";

/// String value type.
pub const NOUN_STRING: &str = "string";

/// Date value type. Marshalled as epoch milliseconds.
pub const NOUN_DATE: &str = "date";

/// Attachment description payload. Self-describing JSON.
pub const NOUN_ATTACHMENT: &str = "attachment-infos";

/// Full-text match parameter. Query-only, never stored on an instance.
pub const NOUN_FULLTEXT: &str = "fulltext";

/// Identity used as a query parameter. Query-only.
pub const NOUN_PARAM_IDENTITY: &str = "parameterized-identity";

// =============================================================================
// ENTITY TYPE NAMES
// =============================================================================

pub const NOUN_CONVERSATION: &str = "conversation";
pub const NOUN_MESSAGE: &str = "message";
pub const NOUN_CONTACT: &str = "contact";
pub const NOUN_IDENTITY: &str = "identity";
pub const NOUN_TAG: &str = "tag";
pub const NOUN_FOLDER: &str = "folder";

/// Noun types a remote client may query by default.
pub const EXPOSED_NOUNS: [&str; 4] = [NOUN_CONTACT, NOUN_IDENTITY, NOUN_CONVERSATION, NOUN_MESSAGE];

/// Default id accessor name for entity types.
pub const DEFAULT_ID_ATTR: &str = "id";

// =============================================================================
// QUERY METHOD NAMES
// =============================================================================

/// Built-in method limiting the result count.
pub const METHOD_LIMIT: &str = "limit";

/// Built-in method ordering the results.
pub const METHOD_ORDER_BY: &str = "orderBy";

/// Suffix of range methods on continuous attributes.
pub const RANGE_SUFFIX: &str = "Range";

/// Suffix of substring methods on likable attributes.
pub const LIKE_SUFFIX: &str = "Like";

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum number of constraints in one query request.
pub const MAX_CONSTRAINTS: usize = 256;

/// Maximum number of arguments to one constraint method.
pub const MAX_CONSTRAINT_ARGS: usize = 1024;

/// Default time a provider gets to complete a query.
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 30_000;
