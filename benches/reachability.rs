use gcroots::constants::DEFAULT_CHUNK_LEN;
use gcroots::*;
use harness::{bench, Bencher};
use std::sync::Mutex;

static HEAPDUMP: Mutex<Option<HeapDump>> = Mutex::new(None);

fn startup() {
    *HEAPDUMP.lock().unwrap() = Some(synthetic::binary_tree(16));
}

fn teardown() {
    let _heapdump = HEAPDUMP.lock().unwrap().take().unwrap();
}

#[bench(startup=startup, teardown=teardown)]
fn reachability(b: &Bencher) {
    let chunk_len = std::env::var("GCROOTS_CHUNK_LEN")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_CHUNK_LEN);
    let heapdump = HEAPDUMP.lock().unwrap().as_ref().unwrap().clone();
    let HeapSnapshot { graph, index } = HeapSnapshot::from_heapdump(heapdump);
    let options = ReachabilityOptions {
        chunk_len,
        spill_dir: None,
    };
    let gate = NearestGcRoot::new(graph, index, options);
    let mut stats = TraversalStats::default();
    b.time(|| {
        stats = gate.stats().unwrap().unwrap();
    });
    b.add_stat("levels", stats.levels);
    b.add_stat("expanded", stats.expanded);
    b.add_stat("leaves", stats.leaves);
    b.add_stat("pending_parents", stats.pending_parents);
    b.add_stat("multiple_parents", stats.multiple_parents);
    b.add_stat("spilled_leaves", gate.leaves().unwrap().spilled());
}
