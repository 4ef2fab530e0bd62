// Resize conformance tests for shm-window
//
// Drives a session against the recording compositor and checks the three
// resources stay consistent: the pool never declares more than the shared
// object holds, and no buffer reaches past the pool.

use std::fs::File;

use proptest::prelude::*;
use shm_window::protocol::recording::{RecordingCompositor, Request};
use shm_window::{ClientConfig, ClientError, HandshakeState, Pool, SharedRegion, ShellEvent, Session, Size};

fn session() -> Session<RecordingCompositor> {
    let mut session = Session::new(ClientConfig::default(), RecordingCompositor::new());
    session.start().unwrap();
    session
}

fn negotiate(session: &mut Session<RecordingCompositor>, width: i32, height: i32, serial: u32) {
    session
        .handle(ShellEvent::ToplevelConfigure { width, height })
        .unwrap();
    session
        .handle(ShellEvent::SurfaceConfigure { serial })
        .unwrap();
}

fn backing_len(region: &SharedRegion) -> u64 {
    let file = File::from(region.fd().try_clone_to_owned().unwrap());
    file.metadata().unwrap().len()
}

fn position(requests: &[Request], pred: impl Fn(&Request) -> bool) -> usize {
    requests.iter().position(pred).expect("request not issued")
}

#[test]
fn test_initial_allocation_at_default_size() {
    let mut session = session();
    negotiate(&mut session, 0, 0, 1);

    let region = session.region().unwrap();
    assert_eq!(region.capacity(), 117 * 150 * 4);
    assert_eq!(backing_len(region), 117 * 150 * 4);
    assert_eq!(session.pool().unwrap().declared_size(), 70_200);

    let buffer = session.buffer().unwrap();
    assert_eq!(buffer.offset(), 0);
    assert_eq!(buffer.stride(), 468);

    assert!(session.compositor().requests().contains(&Request::CreateBuffer {
        buffer: 1,
        pool: 1,
        offset: 0,
        width: 117,
        height: 150,
        stride: 468,
        format: Default::default(),
    }));
}

#[test]
fn test_grow_orders_region_then_pool_then_buffer() {
    let mut session = session();
    negotiate(&mut session, 0, 0, 1);
    session.render_frame().unwrap();
    session.compositor_mut().take_requests();

    session
        .handle(ShellEvent::ToplevelConfigure { width: 155, height: 270 })
        .unwrap();

    let requests = session.compositor().requests();
    let resize = position(requests, |r| matches!(r, Request::ResizePool { .. }));
    let carve = position(requests, |r| matches!(r, Request::CreateBuffer { .. }));
    assert!(resize < carve);

    // The object had already grown when the larger pool was declared.
    assert_eq!(
        requests[resize],
        Request::ResizePool {
            pool: 1,
            size: 167_400,
            backing: 167_400,
        }
    );
    assert!(matches!(
        requests[carve],
        Request::CreateBuffer {
            buffer: 2,
            offset: 0,
            width: 155,
            height: 270,
            stride: 620,
            ..
        }
    ));
    assert!(session.compositor().overcommits().is_empty());

    let region = session.region().unwrap();
    assert!(region.capacity() >= 155 * 270 * 4);
    assert_eq!(backing_len(region), region.capacity());
}

#[test]
fn test_pool_cannot_outgrow_region() {
    let mut compositor = RecordingCompositor::new();
    let region = SharedRegion::create(117 * 150, 4).unwrap();
    let mut pool = Pool::create(&mut compositor, &region).unwrap();
    compositor.take_requests();

    let err = pool
        .grow_to(&mut compositor, &region, 155 * 270 * 4)
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::PoolOverflow {
            requested: 167_400,
            capacity: 70_200,
        }
    ));
    assert_eq!(pool.declared_size(), 70_200);
    assert!(compositor.requests().is_empty());
}

#[test]
fn test_same_size_configure_is_idempotent() {
    let mut session = session();
    negotiate(&mut session, 200, 100, 1);
    session.compositor_mut().take_requests();

    negotiate(&mut session, 200, 100, 2);
    negotiate(&mut session, 0, 0, 3);

    assert_eq!(
        session.compositor().requests(),
        &[
            Request::AckConfigure { serial: 2 },
            Request::AckConfigure { serial: 3 },
        ]
    );
    assert_eq!(session.buffer().unwrap().id(), 1);
}

#[test]
fn test_grow_back_after_shrink_reuses_capacity() {
    let mut session = session();
    negotiate(&mut session, 300, 300, 1);
    negotiate(&mut session, 100, 100, 2);
    session.compositor_mut().take_requests();

    negotiate(&mut session, 250, 250, 3);

    assert_eq!(session.region().unwrap().capacity(), 300 * 300 * 4);
    assert!(!session
        .compositor()
        .requests()
        .iter()
        .any(|r| matches!(r, Request::ResizePool { .. })));
    assert_eq!(session.buffer().unwrap().size(), Size::new(250, 250));
}

#[test]
fn test_close_tears_down_in_order() {
    let mut session = session();
    negotiate(&mut session, 0, 0, 1);
    session.render_frame().unwrap();
    session.compositor_mut().take_requests();

    session.handle(ShellEvent::Close).unwrap();

    assert_eq!(session.state(), HandshakeState::Terminated);
    assert_eq!(
        session.compositor().requests(),
        &[
            Request::DestroyToplevel,
            Request::DestroyXdgSurface,
            Request::DestroySurface,
            Request::DestroyBuffer { buffer: 1 },
            Request::DestroyPool { pool: 1 },
            Request::Disconnect,
        ]
    );
}

#[test]
fn test_close_before_first_configure() {
    let mut session = session();
    session.handle(ShellEvent::Close).unwrap();
    session.handle(ShellEvent::Close).unwrap();

    assert_eq!(
        session.compositor().requests()[2..],
        [
            Request::DestroyToplevel,
            Request::DestroyXdgSurface,
            Request::DestroySurface,
            Request::Disconnect,
        ]
    );
}

#[test]
fn test_close_releases_retired_buffers() {
    let mut session = session();
    negotiate(&mut session, 0, 0, 1);
    session.render_frame().unwrap();
    negotiate(&mut session, 400, 400, 2);
    assert_eq!(session.retired_len(), 1);

    session.shutdown();

    let requests = session.compositor().requests();
    let pool = position(requests, |r| matches!(r, Request::DestroyPool { .. }));
    for id in [1, 2] {
        let buffer = position(requests, |r| *r == Request::DestroyBuffer { buffer: id });
        assert!(buffer < pool);
    }
    assert_eq!(session.retired_len(), 0);
}

#[derive(Debug, Clone)]
enum Step {
    Configure(i32, i32),
    Ack,
    Frame,
    Release(u64),
    Ping(u32),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (-10i32..400, -10i32..400).prop_map(|(w, h)| Step::Configure(w, h)),
        2 => Just(Step::Ack),
        2 => Just(Step::Frame),
        1 => (1u64..12).prop_map(Step::Release),
        1 => any::<u32>().prop_map(Step::Ping),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_resources_stay_consistent(steps in prop::collection::vec(step(), 1..24)) {
        let mut session = session();
        negotiate(&mut session, 0, 0, 1);
        let mut serial = 1;
        let mut capacity = session.region().unwrap().capacity();

        for step in steps {
            match step {
                Step::Configure(w, h) => session
                    .handle(ShellEvent::ToplevelConfigure { width: w, height: h })
                    .unwrap(),
                Step::Ack => {
                    serial += 1;
                    session.handle(ShellEvent::SurfaceConfigure { serial }).unwrap();
                }
                Step::Frame => {
                    let acked = session.surface().acked;
                    prop_assert_eq!(session.render_frame().unwrap(), acked);
                }
                Step::Release(id) => session.handle(ShellEvent::BufferReleased { id }).unwrap(),
                Step::Ping(serial) => session.handle(ShellEvent::Ping { serial }).unwrap(),
            }

            prop_assert_eq!(session.state(), HandshakeState::Ready);
            let region = session.region().unwrap();
            let pool = session.pool().unwrap();
            let buffer = session.buffer().unwrap();

            prop_assert!(region.capacity() >= capacity);
            capacity = region.capacity();
            prop_assert_eq!(backing_len(region), capacity);
            prop_assert!(pool.declared_size() <= capacity);
            prop_assert!(buffer.end() <= pool.declared_size());
            prop_assert_eq!(buffer.stride(), buffer.size().width * 4);
        }

        prop_assert!(session.compositor().overcommits().is_empty());
    }
}
