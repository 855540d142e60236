//! Benchmarks for `VersionWord` using Divan.
//!
//! Run with: `cargo bench --bench versionword`

use divan::{Bencher, black_box};
use txradix::version::VersionWord;

fn main() {
    divan::main();
}

// =============================================================================
// Construction
// =============================================================================

#[divan::bench_group]
mod construction {
    use super::{VersionWord, black_box};

    #[divan::bench]
    const fn new_node() -> VersionWord {
        VersionWord::new()
    }

    #[divan::bench]
    const fn tentative_leaf() -> VersionWord {
        VersionWord::tentative()
    }

    #[divan::bench]
    const fn from_value() -> VersionWord {
        VersionWord::from_value(black_box(0x40))
    }
}

// =============================================================================
// Hot-path reads
// =============================================================================

#[divan::bench_group]
mod reads {
    use super::{Bencher, VersionWord, black_box};

    #[divan::bench]
    fn load(bencher: Bencher) {
        let v = VersionWord::new();
        bencher.bench_local(|| black_box(&v).load());
    }

    #[divan::bench]
    fn is_locked(bencher: Bencher) {
        let v = VersionWord::new();
        bencher.bench_local(|| black_box(&v).is_locked());
    }

    #[divan::bench]
    fn same_version(bencher: Bencher) {
        let a: u64 = black_box(0x40);
        let b: u64 = black_box(0x41);
        bencher.bench_local(|| VersionWord::same_version(a, b));
    }
}

// =============================================================================
// Lock cycle
// =============================================================================

#[divan::bench_group]
mod locking {
    use super::{Bencher, VersionWord};
    use txradix::version::INCREMENT;

    #[divan::bench]
    fn lock_unlock(bencher: Bencher) {
        let v = VersionWord::new();
        bencher.bench_local(|| {
            v.lock();
            v.unlock();
        });
    }

    #[divan::bench]
    fn guard_cycle(bencher: Bencher) {
        let v = VersionWord::new();
        bencher.bench_local(|| {
            let guard = v.lock_guard();
            drop(guard);
        });
    }

    #[divan::bench]
    fn publish_cycle(bencher: Bencher) {
        let v = VersionWord::new();
        bencher.bench_local(|| {
            let guard = v.lock_guard();
            guard.set(guard.value() + INCREMENT);
            drop(guard);
        });
    }
}
