//! Unit tests for the handshake state machine

use super::*;
use crate::protocol::recording::{RecordingCompositor, Request};

fn negotiated() -> Session<RecordingCompositor> {
    let mut session = Session::new(ClientConfig::default(), RecordingCompositor::new());
    session.start().unwrap();
    session
        .handle(ShellEvent::ToplevelConfigure { width: 0, height: 0 })
        .unwrap();
    session
        .handle(ShellEvent::SurfaceConfigure { serial: 1 })
        .unwrap();
    session
}

#[test]
fn test_start_titles_and_commits() {
    let mut session = Session::new(ClientConfig::default(), RecordingCompositor::new());
    assert_eq!(session.state(), HandshakeState::Connecting);

    session.start().unwrap();
    assert_eq!(session.state(), HandshakeState::Negotiating);
    assert_eq!(
        session.compositor().requests(),
        &[Request::SetTitle("My GUI App".into()), Request::Commit]
    );

    assert!(matches!(session.start(), Err(ClientError::InvalidState(_))));
}

#[test]
fn test_zero_configure_uses_default_size() {
    let session = negotiated();

    assert_eq!(session.state(), HandshakeState::Ready);
    assert_eq!(session.buffer().unwrap().size(), Size::new(117, 150));
    assert_eq!(session.region().unwrap().capacity(), 117 * 150 * 4);
    assert_eq!(session.surface().last_serial, Some(1));
}

#[test]
fn test_partial_zero_keeps_one_axis() {
    let mut session = Session::new(ClientConfig::default(), RecordingCompositor::new());
    session.start().unwrap();
    session
        .handle(ShellEvent::ToplevelConfigure { width: 300, height: 0 })
        .unwrap();
    assert_eq!(session.surface().pending, Size::new(300, 150));

    session
        .handle(ShellEvent::ToplevelConfigure { width: -5, height: 90 })
        .unwrap();
    assert_eq!(session.surface().pending, Size::new(117, 90));
}

#[test]
fn test_allocation_precedes_first_ack() {
    let session = negotiated();
    let requests = session.compositor().requests();

    let carve = requests
        .iter()
        .position(|r| matches!(r, Request::CreateBuffer { .. }))
        .unwrap();
    let ack = requests
        .iter()
        .position(|r| matches!(r, Request::AckConfigure { serial: 1 }))
        .unwrap();
    assert!(carve < ack);
}

#[test]
fn test_no_frame_before_ready() {
    let mut session = Session::new(ClientConfig::default(), RecordingCompositor::new());
    assert!(!session.render_frame().unwrap());
    session.start().unwrap();
    session
        .handle(ShellEvent::ToplevelConfigure { width: 50, height: 50 })
        .unwrap();
    assert!(!session.render_frame().unwrap());
    assert!(!session
        .compositor()
        .requests()
        .iter()
        .any(|r| matches!(r, Request::Attach { .. })));
}

#[test]
fn test_frame_fills_and_commits() {
    let mut session = negotiated();
    session.compositor_mut().take_requests();

    assert!(session.render_frame().unwrap());
    assert_eq!(
        session.compositor().requests(),
        &[Request::Attach { buffer: 1 }, Request::Commit]
    );
    assert_eq!(session.frames(), 1);

    let region = session.region.as_mut().unwrap();
    assert_eq!(&region.pixels_mut()[..4], &0xFFFF_0000u32.to_le_bytes());
}

#[test]
fn test_unacked_resize_blocks_frames() {
    let mut session = negotiated();
    session
        .handle(ShellEvent::ToplevelConfigure { width: 155, height: 270 })
        .unwrap();

    assert_eq!(session.state(), HandshakeState::Ready);
    assert!(!session.surface().acked);
    assert!(!session.render_frame().unwrap());

    session
        .handle(ShellEvent::SurfaceConfigure { serial: 2 })
        .unwrap();
    assert!(session.render_frame().unwrap());
}

#[test]
fn test_ping_answered_in_every_live_state() {
    let mut session = Session::new(ClientConfig::default(), RecordingCompositor::new());
    session.handle(ShellEvent::Ping { serial: 10 }).unwrap();
    session.start().unwrap();
    session.handle(ShellEvent::Ping { serial: 11 }).unwrap();
    session
        .handle(ShellEvent::ToplevelConfigure { width: 0, height: 0 })
        .unwrap();
    session
        .handle(ShellEvent::SurfaceConfigure { serial: 1 })
        .unwrap();
    session.handle(ShellEvent::Ping { serial: 12 }).unwrap();

    let pongs: Vec<u32> = session
        .compositor()
        .requests()
        .iter()
        .filter_map(|r| match r {
            Request::Pong { serial } => Some(*serial),
            _ => None,
        })
        .collect();
    assert_eq!(pongs, vec![10, 11, 12]);
}

#[test]
fn test_shrink_carves_smaller_buffer_without_growth() {
    let mut session = negotiated();
    session.compositor_mut().take_requests();

    session
        .handle(ShellEvent::ToplevelConfigure { width: 50, height: 60 })
        .unwrap();

    assert_eq!(session.region().unwrap().capacity(), 117 * 150 * 4);
    assert_eq!(session.pool().unwrap().declared_size(), 117 * 150 * 4);
    assert_eq!(session.buffer().unwrap().size(), Size::new(50, 60));
    assert!(!session
        .compositor()
        .requests()
        .iter()
        .any(|r| matches!(r, Request::ResizePool { .. })));
}

#[test]
fn test_unattached_buffer_destroyed_on_resize() {
    let mut session = negotiated();
    session
        .handle(ShellEvent::ToplevelConfigure { width: 200, height: 200 })
        .unwrap();

    assert_eq!(session.retired_len(), 0);
    assert!(session
        .compositor()
        .requests()
        .contains(&Request::DestroyBuffer { buffer: 1 }));
}

#[test]
fn test_attached_buffer_retired_until_release() {
    let mut session = negotiated();
    session.render_frame().unwrap();
    session
        .handle(ShellEvent::ToplevelConfigure { width: 200, height: 200 })
        .unwrap();
    assert_eq!(session.retired_len(), 1);

    // Release of the current buffer leaves it alone.
    session
        .handle(ShellEvent::BufferReleased { id: 2 })
        .unwrap();
    assert_eq!(session.buffer().unwrap().id(), 2);

    session
        .handle(ShellEvent::BufferReleased { id: 1 })
        .unwrap();
    assert_eq!(session.retired_len(), 0);
    assert!(session
        .compositor()
        .requests()
        .contains(&Request::DestroyBuffer { buffer: 1 }));
}

#[test]
fn test_released_buffer_destroyed_on_resize() {
    let mut session = negotiated();

    for round in 0..5u32 {
        session.render_frame().unwrap();
        let current = session.buffer().unwrap().id();
        session
            .handle(ShellEvent::BufferReleased { id: current })
            .unwrap();
        session
            .handle(ShellEvent::ToplevelConfigure {
                width: 200 + round as i32,
                height: 200,
            })
            .unwrap();
        session
            .handle(ShellEvent::SurfaceConfigure { serial: 2 + round })
            .unwrap();

        assert_eq!(session.retired_len(), 0);
        assert!(session
            .compositor()
            .requests()
            .contains(&Request::DestroyBuffer { buffer: current }));
    }
}

#[test]
fn test_release_then_new_frame_keeps_buffer_busy() {
    let mut session = negotiated();
    session.render_frame().unwrap();
    session
        .handle(ShellEvent::BufferReleased { id: 1 })
        .unwrap();
    session.render_frame().unwrap();

    session
        .handle(ShellEvent::ToplevelConfigure { width: 200, height: 200 })
        .unwrap();
    assert_eq!(session.retired_len(), 1);
}

#[test]
fn test_shutdown_is_idempotent() {
    let mut session = negotiated();
    session.shutdown();
    session.shutdown();
    session.handle(ShellEvent::Close).unwrap();

    let disconnects = session
        .compositor()
        .requests()
        .iter()
        .filter(|r| **r == Request::Disconnect)
        .count();
    assert_eq!(disconnects, 1);
    assert!(session.is_terminated());
    assert!(session.region().is_none());
}

#[test]
fn test_events_ignored_after_teardown() {
    let mut session = negotiated();
    session.handle(ShellEvent::Close).unwrap();
    let before = session.compositor().requests().len();

    session.handle(ShellEvent::Ping { serial: 99 }).unwrap();
    session
        .handle(ShellEvent::ToplevelConfigure { width: 400, height: 400 })
        .unwrap();
    session
        .handle(ShellEvent::SurfaceConfigure { serial: 5 })
        .unwrap();
    assert!(!session.render_frame().unwrap());

    assert_eq!(session.compositor().requests().len(), before);
}

#[test]
fn test_oversized_configure_fails_before_touching_memory() {
    let mut session = negotiated();
    let err = session
        .handle(ShellEvent::ToplevelConfigure {
            width: 40_000,
            height: 40_000,
        })
        .unwrap_err();

    assert!(matches!(err, ClientError::InvalidLayout(_)));
    assert_eq!(session.region().unwrap().capacity(), 117 * 150 * 4);
    assert!(session.compositor().overcommits().is_empty());
}

#[test]
fn test_resolve_size() {
    let fallback = Size::new(10, 20);
    assert_eq!(resolve_size(0, 0, fallback), fallback);
    assert_eq!(resolve_size(30, 0, fallback), Size::new(30, 20));
    assert_eq!(resolve_size(-1, 40, fallback), Size::new(10, 40));
    assert_eq!(resolve_size(5, 6, fallback), Size::new(5, 6));
}
