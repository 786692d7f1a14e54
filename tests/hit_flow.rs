mod common;

use common::{script, StubChain, StubHeaders, StubSource};
use niebla_cfstate::prelude::*;
use std::sync::Arc;

/// Heights whose stored filter matches any of `watch`.
fn scan(filters: &Filters<MemoryStore>, chain: &StubChain, watch: &[Vec<u8>]) -> anyhow::Result<Vec<usize>> {
    let loaded = filters.load_filters(FilterType::Basic, &chain.hashes);
    let mut hits = Vec::new();
    for (height, filter) in loaded.iter().enumerate() {
        let filter = filter.as_ref().ok_or_else(|| anyhow::anyhow!("no filter @{height}"))?;
        let mut query = watch.iter().map(|s| s.as_slice());
        if filter.match_any(&chain.hashes[height], &mut query)? {
            hits.push(height);
        }
    }
    Ok(hits)
}

#[tokio::test]
async fn synced_filters_match_watched_script() -> anyhow::Result<()> {
    let watched = script(0xaa);
    let chain = StubChain::new(vec![
        vec![script(1)],
        vec![script(2), watched.clone()],
        vec![script(3)],
    ]);
    let filters = Arc::new(Filters::open(Chain::UnitTest, MemoryStore::new())?);

    let sync = FilterSync::new(filters.clone(), StubSource::new(&chain), StubHeaders::new(&chain));
    sync.run_to_tip(FilterType::Basic).await?;

    let hits = scan(&filters, &chain, &[watched.as_bytes().to_vec()])?;
    assert_eq!(hits, vec![2], "expected exactly the block paying to the watched script");

    let unseen = scan(&filters, &chain, &[script(0xbb).as_bytes().to_vec()])?;
    assert!(unseen.is_empty());
    Ok(())
}
