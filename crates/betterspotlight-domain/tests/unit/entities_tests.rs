//! Entity enums, wire strings and derived metadata.

use std::str::FromStr;

use betterspotlight_domain::entities::{
    BehaviorEventType, FailureSeverity, ItemKind, LearningBackend, NewItem, PrivacyFlags,
    RolloutMode,
};
use betterspotlight_domain::value_objects::{QueryMode, Role};
use rstest::rstest;

#[rstest]
#[case("instrumentation_only", Ok(RolloutMode::InstrumentationOnly))]
#[case("shadow_training", Ok(RolloutMode::ShadowTraining))]
#[case("blended_ranking", Ok(RolloutMode::BlendedRanking))]
#[case("full_send", Err(()))]
fn rollout_mode_wire_strings(#[case] input: &str, #[case] expected: Result<RolloutMode, ()>) {
    assert_eq!(RolloutMode::from_str(input), expected);
    if let Ok(mode) = expected {
        assert_eq!(mode.as_str(), input);
    }
}

#[test]
fn rollout_modes_are_ordered_by_permissiveness() {
    assert!(RolloutMode::InstrumentationOnly < RolloutMode::ShadowTraining);
    assert!(RolloutMode::ShadowTraining < RolloutMode::BlendedRanking);

    assert!(!RolloutMode::InstrumentationOnly.allows_training());
    assert!(RolloutMode::ShadowTraining.allows_training());
    assert!(!RolloutMode::ShadowTraining.allows_serving());
    assert!(RolloutMode::BlendedRanking.allows_serving());
}

#[rstest]
#[case("none", LearningBackend::None)]
#[case("native_sgd", LearningBackend::NativeSgd)]
#[case("platform_accelerated", LearningBackend::PlatformAccelerated)]
fn learning_backend_round_trip(#[case] wire: &str, #[case] backend: LearningBackend) {
    assert_eq!(backend.as_str(), wire);
    assert_eq!(wire.parse::<LearningBackend>(), Ok(backend));
}

#[test]
fn privacy_flags_any() {
    assert!(!PrivacyFlags::default().any());
    for flag in 0..4 {
        let flags = PrivacyFlags {
            secure_input: flag == 0,
            private_context: flag == 1,
            denylisted_app: flag == 2,
            redacted: flag == 3,
        };
        assert!(flags.any());
    }
}

#[test]
fn only_result_open_is_positive() {
    assert!(BehaviorEventType::ResultOpen.is_positive());
    assert!(!BehaviorEventType::ResultPreview.is_positive());
    assert!(!BehaviorEventType::Dwell.is_positive());
}

#[rstest]
#[case("md", ItemKind::Markdown)]
#[case("pdf", ItemKind::Pdf)]
#[case("rs", ItemKind::Code)]
#[case("jpeg", ItemKind::Image)]
#[case("xyz", ItemKind::Binary)]
fn kind_from_extension(#[case] ext: &str, #[case] expected: ItemKind) {
    assert_eq!(ItemKind::from_extension(ext), expected);
}

#[test]
fn new_item_derives_name_extension_kind_and_parent() {
    let item = NewItem::from_path("/home/user/Docs/Report.PDF", 42, 1.0, 2.0);
    assert_eq!(item.name, "Report.PDF");
    assert_eq!(item.extension.as_deref(), Some("pdf"));
    assert_eq!(item.kind, ItemKind::Pdf);
    assert_eq!(item.parent_path.as_deref(), Some("/home/user/Docs"));
    assert_eq!(item.sensitivity, "normal");
}

#[test]
fn failure_severity_classification() {
    assert_eq!(
        FailureSeverity::classify("extraction", "PDF is encrypted or password-protected"),
        FailureSeverity::ExpectedGap
    );
    assert_eq!(
        FailureSeverity::classify("extraction", "segfault in tokenizer"),
        FailureSeverity::Critical
    );
    assert_eq!(
        FailureSeverity::classify("write", "File is not readable"),
        FailureSeverity::Critical,
        "expected gaps are scoped to the extraction stage"
    );
}

#[test]
fn query_modes_and_roles_have_stable_wire_strings() {
    assert_eq!(QueryMode::Auto.as_str(), "auto");
    assert_eq!("relaxed".parse::<QueryMode>(), Ok(QueryMode::Relaxed));
    assert!("screaming".parse::<QueryMode>().is_err());

    assert_eq!(Role::ALL.len(), 7);
    assert!(Role::RebuildEmbedFast.is_rebuild());
    assert!(!Role::EmbedFast.is_rebuild());
    assert_eq!(Role::QaExtractive.as_str(), "qa_extractive");
}
