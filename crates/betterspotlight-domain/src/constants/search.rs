//! Search-related constants: sanitizer inputs, merge weights, cascade depths.

/// Stopwords filtered by the relaxed FTS sanitizer and the answer-snippet
/// "meaningful token" check.
pub const STOPWORDS: &[&str] = &[
    "a", "an", "any", "and", "are", "at", "for", "from", "how", "in", "is", "it", "my", "of", "on",
    "or", "that", "there", "the", "to", "what", "when", "where", "which", "who", "why", "with",
];

/// Extension tokens the query planner recognizes as a trailing type hint.
pub const KNOWN_TYPE_TOKENS: &[&str] = &[
    "pdf", "docx", "doc", "xlsx", "xls", "pptx", "ppt", "txt", "md", "csv", "json", "xml", "yaml",
    "yml", "png", "jpg", "jpeg", "gif", "svg", "mp3", "mp4", "wav", "avi", "mov", "zip", "tar",
    "gz", "py", "js", "ts", "cpp", "h", "java", "rb", "go", "rs", "swift", "el",
];

/// Relaxed sanitizer: maximum tokens kept in the disjunction.
pub const RELAXED_MAX_TOKENS: usize = 8;

/// Relaxed sanitizer: minimum token length for a prefix wildcard.
pub const RELAXED_WILDCARD_MIN_LEN: usize = 4;

/// Default lexical/semantic merge weights. Always sum to 1.
pub const MERGE_WEIGHT_LEXICAL_DEFAULT: f64 = 0.55;
pub const MERGE_WEIGHT_SEMANTIC_DEFAULT: f64 = 0.45;

/// Adaptive branch weights for natural-language queries. Always sum to 1.
pub const MERGE_WEIGHT_LEXICAL_ADAPTIVE: f64 = 0.45;
pub const MERGE_WEIGHT_SEMANTIC_ADAPTIVE: f64 = 0.55;

/// Fuzzy auto-rewrite budget: at most this many corrected tokens per query.
pub const FUZZY_REWRITE_MAX_CORRECTIONS: usize = 2;

/// Default reranker cascade depths.
pub const RERANKER_STAGE1_MAX_DEFAULT: usize = 50;
pub const RERANKER_STAGE2_MAX_DEFAULT: usize = 10;

/// Default semantic-only admission threshold (cosine similarity).
pub const SEMANTIC_ONLY_SIMILARITY_DEFAULT: f64 = 0.70;

/// Answer snippet: maximum characters before ellipsizing.
pub const ANSWER_SNIPPET_MAX_CHARS: usize = 240;

/// Query cache defaults.
pub const QUERY_CACHE_MAX_ENTRIES: usize = 128;
pub const QUERY_CACHE_TTL_SECONDS: u64 = 30;

/// BM25 field weights for the inverted index (name >> path >> content).
pub const BM25_WEIGHT_NAME: f64 = 10.0;
pub const BM25_WEIGHT_PATH: f64 = 5.0;
pub const BM25_WEIGHT_CONTENT: f64 = 0.5;
