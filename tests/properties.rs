mod common;

use common::*;
use proptest::prelude::*;
use repo_lens::diff::{parse_diff, PASTED_CONTENT};
use repo_lens::docgen::template::README;
use repo_lens::docgen::DocumentGenerator;
use repo_lens::error::Error;
use repo_lens::retry::RetryPolicy;
use std::collections::BTreeSet;

fn omitting(omit: &BTreeSet<u32>) -> Vec<u32> {
    (1..=README.section_count()).filter(|n| !omit.contains(n)).collect()
}

fn section_set() -> impl Strategy<Value = BTreeSet<u32>> {
    proptest::collection::btree_set(1u32..=17, 0..6)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Whatever the model omits on each pass, the generator either returns
    /// a contiguous document or names exactly what is still missing.
    #[test]
    fn prop_generation_is_complete_or_names_gaps(
        first in section_set(),
        second in section_set(),
        third in section_set(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let (a, b, c) = (first.clone(), second.clone(), third.clone());
        let chat = ScriptedChat::new(move |i, _| {
            Ok(match i {
                0 => document_with(&omitting(&a)),
                1 => document_with(&omitting(&b)),
                _ => sections_only(&omitting(&c)),
            })
        });
        let generator = DocumentGenerator::new(chat.clone(), test_config().generation, RetryPolicy::immediate(1));
        let result = runtime.block_on(generator.generate(&README, "Lens", "facts"));

        prop_assert!(chat.calls() <= 3);
        match result {
            Ok(doc) => {
                prop_assert!(doc.draft.is_complete());
                prop_assert_eq!(doc.model_calls as usize, chat.calls());
            }
            Err(Error::IncompleteGeneration { missing }) => {
                prop_assert!(!missing.is_empty());
                prop_assert!(missing.iter().all(|n| third.contains(n)), "missing {:?} not within {:?}", missing, third);
                prop_assert_eq!(chat.calls(), 3);
            }
            Err(other) => prop_assert!(false, "unexpected error: {:?}", other),
        }
    }

    /// Pasted text without diff markers is analyzed as a single file.
    #[test]
    fn prop_plain_text_is_pasted_content(text in "[a-z .\n]{1,200}") {
        prop_assume!(!text.trim().is_empty());
        let files = parse_diff(&text);
        prop_assert_eq!(files.len(), 1);
        prop_assert_eq!(files[0].path.as_str(), PASTED_CONTENT);
    }
}
