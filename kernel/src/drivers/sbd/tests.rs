use alloc::string::ToString;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;

use super::*;
use crate::console::{dmesg_contains, LogLevel};
use crate::module::{load_module, unload_module};
use crate::storage::request::{BlkStatus, Request};
use crate::storage::sim::{FaultPoint, HostEvent, SimBlockLayer};
use crate::util::KError;

fn params(nsectors: u64) -> SbdParams {
    SbdParams { nsectors, ..Default::default() }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

fn assert_host_clean(host: &SimBlockLayer) {
    assert_eq!(host.mem_in_use(), 0);
    assert_eq!(host.queue_count(), 0);
    assert_eq!(host.disks_allocated(), 0);
    assert!(host.nodes().is_empty());
    assert_eq!(host.major_owner(254), None);
}

#[test]
fn test_write_then_read_same_range() {
    let mut host = SimBlockLayer::new();
    let m = SbdModule::init(params(1024), &mut host).unwrap();
    assert_eq!(host.capacity_bytes("sbd0"), Ok(512 * 1024));

    let data = pattern(5120);
    let w = host.submit("sbd0", Request::write(10, 10, data.clone())).unwrap();
    assert_eq!(w.status, BlkStatus::Ok);

    let r = host.submit("sbd0", Request::read(10, 10, 512)).unwrap();
    assert_eq!(r.status, BlkStatus::Ok);
    assert_eq!(r.request.buffer, data);

    m.exit(&mut host);
}

#[test]
fn test_request_past_capacity_is_rejected() {
    let mut host = SimBlockLayer::new();
    let m = SbdModule::init(params(1024), &mut host).unwrap();

    let done = host
        .submit("sbd0", Request::write(1020, 10, vec![0x5Au8; 5120]))
        .unwrap();
    assert_eq!(done.status, BlkStatus::IoErr);
    assert!(m.sbd().device().snapshot().iter().all(|&b| b == 0));
    assert!(dmesg_contains(
        LogLevel::Notice,
        "sbd: beyond-end transfer (offset 522240 len 5120)"
    ));

    // O dispositivo continua servindo depois da falha.
    let ok = host.submit("sbd0", Request::read(1014, 10, 512)).unwrap();
    assert_eq!(ok.status, BlkStatus::Ok);

    m.exit(&mut host);
}

#[test]
fn test_dowork_off_fails_valid_reads() {
    let mut host = SimBlockLayer::new();
    let m = SbdModule::init(SbdParams { dowork: false, ..params(1024) }, &mut host).unwrap();

    let done = host.submit("sbd0", Request::read(0, 1, 512)).unwrap();
    assert_eq!(done.status, BlkStatus::IoErr);
    let mut buf = [0u8; 16];
    assert_eq!(host.read_at("sbd0", 0, &mut buf), Err(KError::IO));

    m.exit(&mut host);
}

#[test]
fn test_queue_failure_releases_backing_store() {
    let mut host = SimBlockLayer::new();
    host.inject_fault(FaultPoint::InitQueue);

    let err = SbdModule::init(params(1024), &mut host).err();
    assert_eq!(err, Some(KError::NoMemory));
    assert_eq!(
        host.events(),
        &[HostEvent::Vmalloc(512 * 1024), HostEvent::Vfree(512 * 1024)]
    );
    assert_host_clean(&host);
}

#[test]
fn test_failure_at_each_step_unwinds_prior_steps() {
    let size = 64 * 512;
    let sbd = || "sbd".to_string();
    let expected: [(FaultPoint, Vec<HostEvent>); 5] = [
        (FaultPoint::Vmalloc, vec![]),
        (
            FaultPoint::InitQueue,
            vec![HostEvent::Vmalloc(size), HostEvent::Vfree(size)],
        ),
        (
            FaultPoint::RegisterBlkdev,
            vec![
                HostEvent::Vmalloc(size),
                HostEvent::InitQueue(1),
                HostEvent::CleanupQueue(1),
                HostEvent::Vfree(size),
            ],
        ),
        (
            FaultPoint::AllocDisk,
            vec![
                HostEvent::Vmalloc(size),
                HostEvent::InitQueue(1),
                HostEvent::RegisterBlkdev(254, sbd()),
                HostEvent::UnregisterBlkdev(254, sbd()),
                HostEvent::CleanupQueue(1),
                HostEvent::Vfree(size),
            ],
        ),
        (
            FaultPoint::AddDisk,
            vec![
                HostEvent::Vmalloc(size),
                HostEvent::InitQueue(1),
                HostEvent::RegisterBlkdev(254, sbd()),
                HostEvent::AllocDisk(SBD_MINORS),
                HostEvent::PutDisk("sbd0".to_string()),
                HostEvent::UnregisterBlkdev(254, sbd()),
                HostEvent::CleanupQueue(1),
                HostEvent::Vfree(size),
            ],
        ),
    ];

    for (point, events) in expected.iter() {
        let mut host = SimBlockLayer::new();
        host.inject_fault(*point);
        assert!(SbdModule::init(params(64), &mut host).is_err(), "{:?}", point);
        assert_eq!(host.events(), &events[..], "{:?}", point);
        assert_host_clean(&host);
    }
    assert_eq!(expected.len(), FaultPoint::ALL.len());
}

#[test]
fn test_bad_config_touches_nothing() {
    let mut host = SimBlockLayer::new();
    let bad = SbdParams { logical_block_size: 1000, ..Default::default() };
    assert_eq!(SbdModule::init(bad, &mut host).err(), Some(KError::Invalid));
    assert!(host.events().is_empty());
}

#[test]
fn test_unload_is_exact_reverse_of_load() {
    let mut host = SimBlockLayer::new();
    let m = SbdModule::init(params(64), &mut host).unwrap();
    assert_eq!(m.state(), LifecycleState::Running);
    assert_eq!(m.resources(), Resources::all());
    assert_eq!(m.major(), 254);
    assert_eq!(m.disk_name(), "sbd0");
    assert_eq!(host.nodes(), vec!["sbd0".to_string()]);

    let loaded: Vec<HostEvent> = host.events().to_vec();
    assert_eq!(loaded.len(), 5);
    host.clear_events();

    m.exit(&mut host);
    let size = 64 * 512;
    assert_eq!(
        host.events(),
        &[
            HostEvent::DelGendisk("sbd0".to_string()),
            HostEvent::PutDisk("sbd0".to_string()),
            HostEvent::UnregisterBlkdev(254, "sbd".to_string()),
            HostEvent::CleanupQueue(1),
            HostEvent::Vfree(size),
        ]
    );
    assert_eq!(loaded[0], HostEvent::Vmalloc(size));
    assert_eq!(loaded[4], HostEvent::AddDisk("sbd0".to_string()));
    assert_host_clean(&host);
    assert_eq!(host.ioctl_getgeo("sbd0"), Err(KError::NotFound));
}

#[test]
fn test_unload_fails_requests_still_queued() {
    let mut host = SimBlockLayer::new();
    let m = SbdModule::init(params(64), &mut host).unwrap();
    let q = Arc::clone(m.queue());
    let tag = q.submit(Request::read(0, 1, 512)).unwrap();

    m.exit(&mut host);
    let done = q.take_completion(tag).unwrap();
    assert_eq!(done.status, BlkStatus::IoErr);
    assert!(q.is_dead());
}

#[test]
fn test_fixed_major_and_registration_notice() {
    let mut host = SimBlockLayer::new();
    let m = SbdModule::init(SbdParams { major_num: 231, ..params(64) }, &mut host).unwrap();
    assert_eq!(m.major(), 231);
    assert_eq!(host.disk("sbd0").unwrap().devt(), (231, 0));
    assert!(dmesg_contains(LogLevel::Warning, "sbd: major number is 231"));
    m.exit(&mut host);
    assert_eq!(host.major_owner(231), None);
}

#[test]
fn test_busy_major_unwinds_queue_and_store() {
    let mut host = SimBlockLayer::new();
    host.register_blkdev(240, "other").unwrap();
    host.clear_events();

    let err = SbdModule::init(SbdParams { major_num: 240, ..params(64) }, &mut host).err();
    assert_eq!(err, Some(KError::Busy));
    assert_eq!(
        host.events(),
        &[
            HostEvent::Vmalloc(64 * 512),
            HostEvent::InitQueue(1),
            HostEvent::CleanupQueue(1),
            HostEvent::Vfree(64 * 512),
        ]
    );
    assert_eq!(host.major_owner(240), Some("other"));
    assert!(dmesg_contains(LogLevel::Warning, "sbd: unable to get major number"));
}

#[test]
fn test_node_behaves_as_flat_byte_array() {
    let mut host = SimBlockLayer::new();
    let m = SbdModule::init(params(16), &mut host).unwrap();

    let data = pattern(1000);
    host.write_at("sbd0", 700, &data).unwrap();

    let mut back = vec![0u8; 1000];
    host.read_at("sbd0", 700, &mut back).unwrap();
    assert_eq!(back, data);

    let mut around = vec![0xFFu8; 1400];
    host.read_at("sbd0", 500, &mut around).unwrap();
    assert!(around[..200].iter().all(|&b| b == 0));
    assert_eq!(&around[200..1200], &data[..]);
    assert!(around[1200..].iter().all(|&b| b == 0));

    let mut past = [0u8; 2];
    assert_eq!(host.read_at("sbd0", 16 * 512 - 1, &mut past), Err(KError::OutOfRange));

    m.exit(&mut host);
}

#[test]
fn test_large_logical_blocks() {
    let mut host = SimBlockLayer::new();
    let m = SbdModule::init(
        SbdParams { logical_block_size: 4096, nsectors: 8, ..Default::default() },
        &mut host,
    )
    .unwrap();
    assert_eq!(m.queue().logical_block_size(), 4096);
    assert_eq!(host.disk("sbd0").unwrap().get_capacity(), 64);
    assert_eq!(host.capacity_bytes("sbd0"), Ok(32768));

    let data = pattern(4096);
    let done = host.submit("sbd0", Request::write(7, 1, data.clone())).unwrap();
    assert_eq!(done.status, BlkStatus::Ok);
    assert_eq!(&m.sbd().device().snapshot()[7 * 4096..], &data[..]);

    m.exit(&mut host);
}

#[test]
fn test_geometry_query() {
    let mut host = SimBlockLayer::new();
    let m = SbdModule::init(params(1024), &mut host).unwrap();
    let geo = host.ioctl_getgeo("sbd0").unwrap();
    assert_eq!((geo.cylinders, geo.heads, geo.sectors, geo.start), (16, 4, 16, 0));
    m.exit(&mut host);
}

#[test]
fn test_loader_reports_errno() {
    let mut host = SimBlockLayer::new();
    let m = load_module::<SbdModule>("nsectors=128 debug", &mut host).unwrap();
    assert!(m.sbd().params().debug);
    assert_eq!(m.sbd().device().capacity_bytes(), 128 * 512);
    unload_module(m, &mut host);
    assert_host_clean(&host);

    host.inject_fault(FaultPoint::Vmalloc);
    assert_eq!(load_module::<SbdModule>("", &mut host).err(), Some(-12));
    assert_eq!(load_module::<SbdModule>("nsectors=0", &mut host).err(), Some(-22));
    assert_eq!(load_module::<SbdModule>("colour=blue", &mut host).err(), Some(-22));
    assert_host_clean(&host);
}

#[test]
fn test_memory_limit_aborts_load() {
    let mut host = SimBlockLayer::new().with_memory_limit(1024);
    assert_eq!(SbdModule::init(params(65536), &mut host).err(), Some(KError::NoMemory));
    assert!(host.events().is_empty());
}

#[test]
fn test_batch_completes_in_submission_order() {
    let mut host = SimBlockLayer::new();
    let m = SbdModule::init(params(64), &mut host).unwrap();

    let done = host
        .submit_batch(
            "sbd0",
            vec![
                Request::write(0, 2, vec![0xA5u8; 1024]),
                Request::write(63, 2, vec![0x5Au8; 1024]),
                Request::read(0, 2, 512),
            ],
        )
        .unwrap();
    let statuses: Vec<BlkStatus> = done.iter().map(|c| c.status).collect();
    assert_eq!(statuses, vec![BlkStatus::Ok, BlkStatus::IoErr, BlkStatus::Ok]);
    assert!(done.windows(2).all(|w| w[0].tag < w[1].tag));
    assert_eq!(done[2].request.buffer, vec![0xA5u8; 1024]);
    assert!(m.queue().take_completions().is_empty());

    m.exit(&mut host);
}

#[test]
fn test_concurrent_dispatch_keeps_ranges_apart() {
    const THREADS: u64 = 8;
    const ROUNDS: usize = 100;
    const SPAN: u32 = 8;

    let mut host = SimBlockLayer::new();
    let m = SbdModule::init(params(THREADS * SPAN as u64), &mut host).unwrap();
    let q = Arc::clone(m.queue());

    let fill = |t: u64, round: usize| ((t as u8) << 4) | (round % 16) as u8;

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let q = Arc::clone(&q);
            std::thread::spawn(move || {
                let mut statuses = Vec::with_capacity(ROUNDS);
                for round in 0..ROUNDS {
                    let data = vec![fill(t, round); SPAN as usize * 512];
                    let tag = q.submit(Request::write(t * SPAN as u64, SPAN, data)).unwrap();
                    q.run();
                    // Outro thread pode ter pego o request; espera ele completar.
                    let done = loop {
                        if let Some(c) = q.take_completion(tag) {
                            break c;
                        }
                        std::thread::yield_now();
                    };
                    statuses.push(done.status);
                }
                statuses
            })
        })
        .collect();

    let mut completed = 0;
    for w in workers {
        let statuses = w.join().unwrap();
        assert!(statuses.iter().all(|s| s.is_ok()));
        completed += statuses.len();
    }
    assert_eq!(completed, THREADS as usize * ROUNDS);
    assert_eq!(q.stats().completed_ok, completed as u64);
    assert_eq!(q.pending_len(), 0);

    let store = m.sbd().device().snapshot();
    let span = SPAN as usize * 512;
    for t in 0..THREADS {
        let range = &store[t as usize * span..(t as usize + 1) * span];
        let last = fill(t, ROUNDS - 1);
        assert!(range.iter().all(|&b| b == last), "thread {}", t);
    }

    m.exit(&mut host);
}

#[test]
fn test_illegal_transition_is_reported() {
    let mut lc = Lifecycle { state: LifecycleState::Unloaded };
    lc.advance(LifecycleState::Running);
    assert_eq!(lc.state, LifecycleState::Running);
    assert!(dmesg_contains(
        LogLevel::Err,
        "sbd: illegal transition Unloaded -> Running"
    ));
}

#[test]
fn test_transition_table() {
    use LifecycleState::*;
    let forward = [
        Unloaded,
        Configuring,
        StateAllocated,
        QueueAllocated,
        Registered,
        DiskExposed,
        Running,
        Unregistering,
        QueueReleasing,
        StateReleasing,
        Unloaded,
    ];
    for w in forward.windows(2) {
        assert!(w[0].can_advance_to(w[1]), "{:?} -> {:?}", w[0], w[1]);
    }
    assert!(!Unloaded.can_advance_to(Running));
    assert!(!Running.can_advance_to(StateReleasing));
    assert!(!Registered.can_advance_to(Running));
    assert!(!StateReleasing.can_advance_to(QueueReleasing));
}
