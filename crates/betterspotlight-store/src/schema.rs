//! Schema DDL, seeded settings and the schema version.

/// Current schema version recorded in the `schema_version` setting.
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// Schema CREATE statements, applied one by one on first open.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r"CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    extension TEXT,
    kind TEXT NOT NULL,
    size INTEGER NOT NULL DEFAULT 0,
    created_at REAL NOT NULL,
    modified_at REAL NOT NULL,
    indexed_at REAL NOT NULL,
    content_hash TEXT,
    sensitivity TEXT NOT NULL DEFAULT 'normal',
    is_pinned INTEGER NOT NULL DEFAULT 0,
    parent_path TEXT
)",
    "CREATE INDEX IF NOT EXISTS idx_items_parent_path ON items(parent_path)",
    "CREATE INDEX IF NOT EXISTS idx_items_kind ON items(kind)",
    "CREATE INDEX IF NOT EXISTS idx_items_modified_at ON items(modified_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_items_name ON items(name)",
    "CREATE INDEX IF NOT EXISTS idx_items_indexed_at ON items(indexed_at DESC)",
    r"CREATE TABLE IF NOT EXISTS content (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    chunk_text TEXT NOT NULL,
    chunk_hash TEXT NOT NULL,
    UNIQUE(item_id, chunk_index)
)",
    "CREATE INDEX IF NOT EXISTS idx_content_item_id ON content(item_id)",
    "CREATE INDEX IF NOT EXISTS idx_content_chunk_hash ON content(chunk_hash)",
    r"CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    tag TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT 'system',
    UNIQUE(item_id, tag)
)",
    "CREATE INDEX IF NOT EXISTS idx_tags_item_id ON tags(item_id)",
    r"CREATE TABLE IF NOT EXISTS failures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    stage TEXT NOT NULL,
    error_message TEXT,
    failure_count INTEGER NOT NULL DEFAULT 1,
    first_failed_at REAL NOT NULL,
    last_failed_at REAL NOT NULL,
    UNIQUE(item_id, stage)
)",
    "CREATE INDEX IF NOT EXISTS idx_failures_item_id ON failures(item_id)",
    "CREATE INDEX IF NOT EXISTS idx_failures_last_failed_at ON failures(last_failed_at DESC)",
    r"CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)",
    r"CREATE TABLE IF NOT EXISTS feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    action TEXT NOT NULL,
    query TEXT,
    result_position INTEGER,
    timestamp REAL NOT NULL
)",
    "CREATE INDEX IF NOT EXISTS idx_feedback_item_id ON feedback(item_id)",
    "CREATE INDEX IF NOT EXISTS idx_feedback_action ON feedback(action)",
    "CREATE INDEX IF NOT EXISTS idx_feedback_timestamp ON feedback(timestamp DESC)",
    r"CREATE TABLE IF NOT EXISTS frequencies (
    item_id INTEGER PRIMARY KEY REFERENCES items(id) ON DELETE CASCADE,
    open_count INTEGER NOT NULL DEFAULT 0,
    last_opened_at REAL,
    total_interactions INTEGER NOT NULL DEFAULT 0
)",
    "CREATE INDEX IF NOT EXISTS idx_frequencies_open_count ON frequencies(open_count DESC)",
    r"CREATE TABLE IF NOT EXISTS vector_map (
    item_id INTEGER PRIMARY KEY REFERENCES items(id) ON DELETE CASCADE,
    dense_label INTEGER NOT NULL,
    model_version TEXT NOT NULL,
    generation INTEGER NOT NULL DEFAULT 0,
    embedded_at REAL NOT NULL,
    UNIQUE(dense_label, generation)
)",
    "CREATE INDEX IF NOT EXISTS idx_vector_map_label ON vector_map(dense_label)",
    r"CREATE TABLE IF NOT EXISTS vector_generation_state (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    active_version INTEGER NOT NULL DEFAULT 0,
    rollback_version INTEGER NOT NULL DEFAULT 0
)",
    r"CREATE TABLE IF NOT EXISTS interactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    query_normalized TEXT NOT NULL,
    item_id INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
    path TEXT NOT NULL,
    match_type TEXT NOT NULL,
    result_position INTEGER NOT NULL,
    app_context TEXT,
    timestamp REAL NOT NULL
)",
    "CREATE INDEX IF NOT EXISTS idx_interactions_query ON interactions(query_normalized)",
    "CREATE INDEX IF NOT EXISTS idx_interactions_item ON interactions(item_id)",
    r"CREATE TABLE IF NOT EXISTS behavior_events_v1 (
    event_id TEXT PRIMARY KEY,
    event_type TEXT NOT NULL,
    source TEXT,
    timestamp REAL NOT NULL,
    item_id INTEGER,
    item_path TEXT,
    query TEXT,
    app_bundle_id TEXT,
    context_event_id TEXT,
    activity_digest TEXT,
    attribution_confidence REAL NOT NULL DEFAULT 0,
    attributed_positive INTEGER NOT NULL DEFAULT 0
)",
    "CREATE INDEX IF NOT EXISTS idx_behavior_events_timestamp ON behavior_events_v1(timestamp)",
    r"CREATE TABLE IF NOT EXISTS training_examples_v1 (
    sample_id TEXT PRIMARY KEY,
    query TEXT NOT NULL,
    item_id INTEGER NOT NULL,
    features TEXT NOT NULL,
    label INTEGER NOT NULL,
    weight REAL NOT NULL DEFAULT 1,
    attribution_confidence REAL NOT NULL DEFAULT 0,
    consumed INTEGER NOT NULL DEFAULT 0,
    created_at REAL NOT NULL
)",
    "CREATE INDEX IF NOT EXISTS idx_training_examples_consumed ON training_examples_v1(consumed, created_at)",
    r"CREATE TABLE IF NOT EXISTS replay_reservoir_v1 (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    item_id INTEGER NOT NULL,
    features TEXT NOT NULL,
    inserted_at REAL NOT NULL
)",
    r"CREATE TABLE IF NOT EXISTS learning_model_state_v1 (
    name TEXT PRIMARY KEY,
    active_version INTEGER NOT NULL DEFAULT 0,
    rollback_version INTEGER NOT NULL DEFAULT 0,
    active_backend TEXT NOT NULL DEFAULT 'none',
    last_cycle_status TEXT NOT NULL DEFAULT '',
    last_cycle_reason TEXT NOT NULL DEFAULT '',
    cycles_run INTEGER NOT NULL DEFAULT 0,
    promotions INTEGER NOT NULL DEFAULT 0,
    rejections INTEGER NOT NULL DEFAULT 0
)",
    r"CREATE VIRTUAL TABLE IF NOT EXISTS search_index USING fts5(
    file_name,
    file_path,
    content,
    chunk_id UNINDEXED,
    file_id UNINDEXED,
    tokenize = 'porter unicode61 remove_diacritics 2'
)",
];

/// BM25 field weights: name >> path >> content. Non-fatal; FTS falls back
/// to equal weights when this insert fails.
pub const FTS_WEIGHT_CONFIG: &str =
    "INSERT INTO search_index(search_index, rank) VALUES('rank', 'bm25(10.0, 5.0, 0.5)')";

/// Default settings rows, seeded with INSERT OR IGNORE so user-changed
/// values survive reopen.
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("schema_version", "2"),
    ("last_full_index_at", "0"),
    ("last_vacuum_at", "0"),
    ("lastFeedbackAggregation", "0"),
    ("max_file_size", "104857600"),
    ("extraction_timeout_ms", "5000"),
    ("chunk_size_bytes", "4096"),
    ("bm25WeightName", "10.0"),
    ("bm25WeightPath", "5.0"),
    ("bm25WeightContent", "0.5"),
    ("lexicalWeight", "0.55"),
    ("semanticSimilarityThreshold", "0.7"),
    ("semanticBudgetMs", "150"),
    ("rerankBudgetMs", "200"),
    ("embeddingEnabled", "0"),
    ("inferenceServiceEnabled", "1"),
    ("inferenceEmbedOffloadEnabled", "1"),
    ("inferenceRerankOffloadEnabled", "1"),
    ("inferenceQaOffloadEnabled", "1"),
    ("inferenceShadowModeEnabled", "0"),
    ("queryRouterEnabled", "0"),
    ("queryRouterMinConfidence", "0.5"),
    ("fastEmbeddingEnabled", "0"),
    ("dualEmbeddingFusionEnabled", "0"),
    ("strongEmbeddingTopK", "50"),
    ("fastEmbeddingTopK", "100"),
    ("rerankerCascadeEnabled", "1"),
    ("rerankerStage1Max", "50"),
    ("rerankerStage2Max", "10"),
    ("autoVectorMigration", "1"),
    ("qaSnippetEnabled", "1"),
    ("personalizedLtrEnabled", "0"),
    ("behaviorStreamEnabled", "0"),
    ("learningEnabled", "0"),
    ("learningPauseOnUserInput", "1"),
    ("onlineRankerRolloutMode", "instrumentation_only"),
    ("onlineRankerBlendAlpha", "0.25"),
    ("onlineRankerMinExamples", "25"),
    ("onlineRankerEpochs", "3"),
    ("onlineRankerLearningRate", "0.05"),
    ("onlineRankerPromotionLatencyRegressionPctMax", "25"),
    ("onlineRankerPromotionPredictionFailureRateMax", "0.02"),
    ("onlineRankerPromotionSaturationRateMax", "0.35"),
    ("behaviorRawRetentionDays", "30"),
    ("feedbackRetentionDays", "90"),
    ("interactionRetentionDays", "180"),
    ("enableFeedbackLogging", "1"),
    ("enableInteractionTracking", "1"),
];
