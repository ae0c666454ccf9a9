//! Keys of the `settings` relation read by the services.
//!
//! The settings relation mirrors a subset of user preferences; services read
//! these through the store's typed accessor rather than a mutable global.

pub const SCHEMA_VERSION: &str = "schema_version";
pub const LAST_FULL_INDEX_AT: &str = "last_full_index_at";
pub const LAST_VACUUM_AT: &str = "last_vacuum_at";
pub const LAST_FEEDBACK_AGGREGATION: &str = "lastFeedbackAggregation";

pub const MAX_FILE_SIZE: &str = "max_file_size";
pub const EXTRACTION_TIMEOUT_MS: &str = "extraction_timeout_ms";
pub const CHUNK_SIZE_BYTES: &str = "chunk_size_bytes";

pub const EMBEDDING_ENABLED: &str = "embeddingEnabled";
pub const INFERENCE_SERVICE_ENABLED: &str = "inferenceServiceEnabled";
pub const INFERENCE_EMBED_OFFLOAD_ENABLED: &str = "inferenceEmbedOffloadEnabled";
pub const INFERENCE_RERANK_OFFLOAD_ENABLED: &str = "inferenceRerankOffloadEnabled";
pub const INFERENCE_QA_OFFLOAD_ENABLED: &str = "inferenceQaOffloadEnabled";
pub const INFERENCE_SHADOW_MODE_ENABLED: &str = "inferenceShadowModeEnabled";

pub const QUERY_ROUTER_ENABLED: &str = "queryRouterEnabled";
pub const QUERY_ROUTER_MIN_CONFIDENCE: &str = "queryRouterMinConfidence";
pub const FAST_EMBEDDING_ENABLED: &str = "fastEmbeddingEnabled";
pub const DUAL_EMBEDDING_FUSION_ENABLED: &str = "dualEmbeddingFusionEnabled";
pub const STRONG_EMBEDDING_TOP_K: &str = "strongEmbeddingTopK";
pub const FAST_EMBEDDING_TOP_K: &str = "fastEmbeddingTopK";

pub const RERANKER_CASCADE_ENABLED: &str = "rerankerCascadeEnabled";
pub const RERANKER_STAGE1_MAX: &str = "rerankerStage1Max";
pub const RERANKER_STAGE2_MAX: &str = "rerankerStage2Max";

pub const AUTO_VECTOR_MIGRATION: &str = "autoVectorMigration";
pub const BM25_WEIGHT_NAME: &str = "bm25WeightName";
pub const BM25_WEIGHT_PATH: &str = "bm25WeightPath";
pub const BM25_WEIGHT_CONTENT: &str = "bm25WeightContent";
pub const LEXICAL_WEIGHT: &str = "lexicalWeight";
pub const SEMANTIC_SIMILARITY_THRESHOLD: &str = "semanticSimilarityThreshold";
pub const SEMANTIC_BUDGET_MS: &str = "semanticBudgetMs";
pub const RERANK_BUDGET_MS: &str = "rerankBudgetMs";

pub const QA_SNIPPET_ENABLED: &str = "qaSnippetEnabled";

pub const PERSONALIZED_LTR_ENABLED: &str = "personalizedLtrEnabled";
pub const BEHAVIOR_STREAM_ENABLED: &str = "behaviorStreamEnabled";
pub const LEARNING_ENABLED: &str = "learningEnabled";
pub const LEARNING_PAUSE_ON_USER_INPUT: &str = "learningPauseOnUserInput";
pub const ONLINE_RANKER_ROLLOUT_MODE: &str = "onlineRankerRolloutMode";
pub const ONLINE_RANKER_BLEND_ALPHA: &str = "onlineRankerBlendAlpha";
pub const ONLINE_RANKER_MIN_EXAMPLES: &str = "onlineRankerMinExamples";
pub const ONLINE_RANKER_EPOCHS: &str = "onlineRankerEpochs";
pub const ONLINE_RANKER_LEARNING_RATE: &str = "onlineRankerLearningRate";
pub const ONLINE_RANKER_PROMOTION_LATENCY_REGRESSION_PCT_MAX: &str =
    "onlineRankerPromotionLatencyRegressionPctMax";
pub const ONLINE_RANKER_PROMOTION_PREDICTION_FAILURE_RATE_MAX: &str =
    "onlineRankerPromotionPredictionFailureRateMax";
pub const ONLINE_RANKER_PROMOTION_SATURATION_RATE_MAX: &str =
    "onlineRankerPromotionSaturationRateMax";
pub const BEHAVIOR_RAW_RETENTION_DAYS: &str = "behaviorRawRetentionDays";

pub const FEEDBACK_RETENTION_DAYS: &str = "feedbackRetentionDays";
pub const INTERACTION_RETENTION_DAYS: &str = "interactionRetentionDays";
pub const ENABLE_FEEDBACK_LOGGING: &str = "enableFeedbackLogging";
pub const ENABLE_INTERACTION_TRACKING: &str = "enableInteractionTracking";
