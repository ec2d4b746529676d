#[cfg(test)]
mod registry_concurrency_tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use wanpool::audit::run_audit;
    use wanpool::pool::{
        AddressPool, CustomerClass, MemoryStore, PoolError, PoolRegistry, PoolStore,
        RetrySettings,
    };

    fn addr(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn pool(id: &str, start: &str, end: &str, prefix: u8) -> AddressPool {
        AddressPool::new(
            id,
            "east",
            CustomerClass::Residential,
            addr(start),
            addr(end),
            prefix,
            None,
        )
        .unwrap()
    }

    /// Registry tuned so contention retries never run out of budget
    fn contended_registry(store: Arc<MemoryStore>) -> PoolRegistry {
        PoolRegistry::new(store).with_retry_settings(RetrySettings {
            max_attempts: 64,
            initial_backoff: Duration::from_millis(1),
        })
    }

    /// Test that racing allocators never hand out the same address twice
    #[test]
    fn test_concurrent_allocations_yield_distinct_addresses() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 4;

        let store = Arc::new(MemoryStore::new());
        let registry = contended_registry(store.clone());
        registry
            .activate_pool(pool("shared", "10.50.0.0", "10.50.0.63", 26))
            .unwrap();

        let assigned: Vec<Ipv4Addr> = thread::scope(|scope| {
            let mut handles = Vec::new();
            for t in 0..THREADS {
                let registry = &registry;
                handles.push(scope.spawn(move || {
                    let mut got = Vec::new();
                    for i in 0..PER_THREAD {
                        let account = format!("acct-{}-{}", t, i);
                        let assignment = registry.allocate_next("shared", &account).unwrap();
                        got.push(assignment.assigned_ip);
                    }
                    got
                }));
            }
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(assigned.len(), THREADS * PER_THREAD);
        let mut unique = assigned.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(
            unique.len(),
            assigned.len(),
            "duplicate address issued under contention: {:?}",
            assigned
        );

        let stored = store.load_pool("shared").unwrap();
        assert_eq!(stored.used_addresses, (THREADS * PER_THREAD) as u64);
        assert_eq!(
            stored.available_addresses,
            stored.total_addresses - (THREADS * PER_THREAD) as u64
        );
    }

    /// Test that a full pool refuses extra racers instead of double-assigning
    #[test]
    fn test_exhaustion_under_contention_is_exact() {
        const THREADS: usize = 8;

        let store = Arc::new(MemoryStore::new());
        let registry = contended_registry(store.clone());
        registry
            .activate_pool(pool("tiny", "10.60.0.10", "10.60.0.13", 30))
            .unwrap();

        let outcomes: Vec<Result<Ipv4Addr, PoolError>> = thread::scope(|scope| {
            let mut handles = Vec::new();
            for t in 0..THREADS {
                let registry = &registry;
                handles.push(scope.spawn(move || {
                    let account = format!("acct-{}", t);
                    registry
                        .allocate_next("tiny", &account)
                        .map(|a| a.assigned_ip)
                }));
            }
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut issued: Vec<Ipv4Addr> = Vec::new();
        let mut refused = 0;
        for outcome in outcomes {
            match outcome {
                Ok(ip) => issued.push(ip),
                Err(PoolError::PoolExhausted(id)) => {
                    assert_eq!(id, "tiny");
                    refused += 1;
                }
                Err(other) => panic!("unexpected error under contention: {other}"),
            }
        }

        issued.sort();
        assert_eq!(
            issued,
            vec![
                addr("10.60.0.10"),
                addr("10.60.0.11"),
                addr("10.60.0.12"),
                addr("10.60.0.13"),
            ]
        );
        assert_eq!(refused, THREADS - 4);

        let stored = store.load_pool("tiny").unwrap();
        assert_eq!(stored.available_addresses, 0);
        assert_eq!(stored.used_addresses, stored.total_addresses);
    }

    /// Test that a released address becomes reissuable, threads racing or not
    #[test]
    fn test_release_then_allocate_reissues_address() {
        let store = Arc::new(MemoryStore::new());
        let registry = contended_registry(store.clone());
        registry
            .activate_pool(pool("small", "10.70.0.1", "10.70.0.4", 30))
            .unwrap();

        let mut assignments = Vec::new();
        for i in 0..4 {
            assignments.push(registry.allocate_next("small", &format!("a{i}")).unwrap());
        }
        assert!(matches!(
            registry.allocate_next("small", "overflow"),
            Err(PoolError::PoolExhausted(_))
        ));

        let victim = assignments.remove(1);
        registry.release_assignment(&victim.id).unwrap();

        let reelected = registry.allocate_next("small", "replacement").unwrap();
        assert_eq!(reelected.assigned_ip, victim.assigned_ip);

        let stored = store.load_pool("small").unwrap();
        assert_eq!(stored.used_addresses, 4);
        assert_eq!(stored.available_addresses, 0);
    }

    /// Test that churn over many threads settles into an auditable state
    #[test]
    fn test_churn_settles_clean() {
        const THREADS: usize = 4;
        const ROUNDS: usize = 8;

        let store = Arc::new(MemoryStore::new());
        let registry = contended_registry(store.clone());
        registry
            .activate_pool(pool("churn", "10.80.0.0", "10.80.0.31", 27))
            .unwrap();

        thread::scope(|scope| {
            for t in 0..THREADS {
                let registry = &registry;
                scope.spawn(move || {
                    for i in 0..ROUNDS {
                        let account = format!("churn-{}-{}", t, i);
                        let assignment = registry.allocate_next("churn", &account).unwrap();
                        registry.release_assignment(&assignment.id).unwrap();
                    }
                });
            }
        });

        let stored = store.load_pool("churn").unwrap();
        assert_eq!(stored.used_addresses, 0);
        assert_eq!(stored.available_addresses, stored.total_addresses);

        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.assignments.len(), THREADS * ROUNDS);
        assert!(snapshot.assignments.iter().all(|a| !a.is_active));

        let report = run_audit(&snapshot);
        assert!(report.clean(), "audit findings: {:?}", report.findings);
    }
}
