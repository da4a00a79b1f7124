//! Property-based tests for pass progress

use fieldsync::client::sync::ProgressTracker;
use proptest::prelude::*;

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #[test]
    fn test_overall_progress_never_decreases(
        assets in proptest::collection::vec((1u64..500_000, 1usize..8, any::<bool>()), 1..6),
    ) {
        let observed = block_on(async {
            let tracker = ProgressTracker::new();
            let bytes_total: u64 = assets.iter().map(|(size, _, _)| size).sum();
            let mut observed = vec![tracker.begin(assets.len() as u32, bytes_total).await.overall_progress];

            for (index, (size, chunks, uploaded)) in assets.iter().enumerate() {
                observed.push(tracker.begin_asset(&format!("asset-{}", index), *size).await.overall_progress);
                for chunk in 1..=*chunks as u64 {
                    let sent = size * chunk / *chunks as u64;
                    observed.push(tracker.asset_bytes(sent).await.overall_progress);
                }
                observed.push(tracker.finish_asset(*uploaded).await.overall_progress);
            }
            observed.push(tracker.finish(true).await.overall_progress);
            observed
        });

        for pair in observed.windows(2) {
            prop_assert!(pair[0] <= pair[1], "progress decreased: {:?}", observed);
        }
        prop_assert!(observed.iter().all(|pct| *pct <= 100));
        prop_assert_eq!(observed.last(), Some(&100));
    }
}
