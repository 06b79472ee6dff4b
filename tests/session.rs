mod common;

use std::sync::mpsc;
use std::sync::Arc;

use common::{chunk, frame, Manual};
use usbtv::buffer::State;
use usbtv::transport::Status;
use usbtv::{Config, Error, FieldOrder, FrameBuffer, Norm, Parity, Session};

const PACKETS: usize = 8;

fn session() -> (
    Arc<Manual>,
    Session<Arc<Manual>>,
    mpsc::Receiver<FrameBuffer>,
) {
    let manual = Manual::new();
    let (tx, rx) = mpsc::channel();
    let session = Session::new(manual.clone(), tx).unwrap();
    (manual, session, rx)
}

fn buffers(session: &Session<Arc<Manual>>, n: usize) {
    let size = session.geometry().frame_size();
    for i in 0..n {
        session.enqueue(FrameBuffer::new(i, size)).unwrap();
    }
}

#[test]
fn start_submits_whole_pool() {
    let (manual, session, _rx) = session();
    session.start().unwrap();

    assert!(session.is_streaming());
    assert!(manual.is_streaming());
    assert_eq!(manual.pending(), 16);
    assert_eq!(session.scheduler().outstanding(), 16);
}

#[test]
fn complete_frame_is_delivered_done() {
    let (manual, session, rx) = session();
    buffers(&session, 1);
    session.start().unwrap();

    manual.stream(&frame(3, session.geometry()), PACKETS);

    let buf = rx.try_recv().unwrap();
    assert_eq!(buf.state(), State::Done);
    assert_eq!(buf.meta().sequence, 0);
    assert_eq!(buf.meta().field, FieldOrder::Interlaced);
    assert_eq!(buf.data().len(), session.geometry().frame_size());
    assert!(buf.data().iter().all(|&b| b == 3));
    assert_eq!(session.queued(), 0);
    // every completion was resubmitted
    assert_eq!(manual.pending(), 16);
}

#[test]
fn missing_chunk_is_delivered_as_error() {
    let (manual, session, rx) = session();
    buffers(&session, 2);
    session.start().unwrap();

    let geometry = session.geometry();
    let mut partial = frame(1, geometry);
    partial.remove(100);
    manual.stream(&partial, PACKETS);
    manual.stream(&frame(2, geometry), PACKETS);

    let first = rx.try_recv().unwrap();
    assert_eq!(first.state(), State::Error);
    assert_eq!(first.meta().sequence, 0);

    let second = rx.try_recv().unwrap();
    assert_eq!(second.state(), State::Done);
    assert_eq!(second.meta().sequence, 1);
}

#[test]
fn sequence_numbers_have_no_gaps() {
    let (manual, session, rx) = session();
    buffers(&session, 2);
    session.start().unwrap();

    let geometry = session.geometry();
    for id in 0..6u8 {
        manual.stream(&frame(id, geometry), PACKETS);
        // recycle the buffer right away
        let buf = rx.try_recv().unwrap();
        assert_eq!(buf.state(), State::Done);
        assert_eq!(buf.meta().sequence, id as u32);
        session.enqueue(buf).unwrap();
    }
}

#[test]
fn stop_while_filling_flushes_queue() {
    let (manual, session, rx) = session();
    buffers(&session, 2);
    session.start().unwrap();

    let chunks = frame(4, session.geometry());
    manual.stream(&chunks[..200], PACKETS);
    assert!(rx.try_recv().is_err());

    session.stop().unwrap();
    assert!(!session.is_streaming());
    assert!(!manual.is_streaming());
    assert_eq!(manual.pending(), 0);
    assert_eq!(session.queued(), 0);

    let flushed: Vec<FrameBuffer> = rx.try_iter().collect();
    assert_eq!(flushed.len(), 2);
    assert_eq!(flushed[0].index(), 0);
    assert!(flushed.iter().all(|b| b.state() == State::Error));
}

#[test]
fn corrupt_chunks_never_touch_buffers() {
    let (manual, session, rx) = session();
    let size = session.geometry().frame_size();
    session
        .enqueue(FrameBuffer::from_vec(0, vec![0x55; size]))
        .unwrap();
    session.start().unwrap();

    let corrupt: Vec<Vec<u8>> = frame(1, session.geometry())
        .into_iter()
        .map(|mut c| {
            c[0] = 0x87;
            c
        })
        .collect();
    manual.stream(&corrupt, PACKETS);
    assert!(rx.try_recv().is_err());

    session.stop().unwrap();
    let buf = rx.try_recv().unwrap();
    assert_eq!(buf.state(), State::Error);
    assert!(buf.data().iter().all(|&b| b == 0x55));
}

#[test]
fn frames_without_buffer_are_dropped() {
    let (manual, session, rx) = session();
    session.start().unwrap();

    let geometry = session.geometry();
    manual.stream(&frame(1, geometry), PACKETS);
    assert!(rx.try_recv().is_err());

    buffers(&session, 1);
    manual.stream(&frame(2, geometry), PACKETS);
    let buf = rx.try_recv().unwrap();
    assert_eq!(buf.state(), State::Done);
    // the dropped frame did not consume a sequence number
    assert_eq!(buf.meta().sequence, 0);
    assert!(buf.data().iter().all(|&b| b == 2));
}

#[test]
fn stale_tail_of_superseded_frame_is_ignored() {
    let (manual, session, rx) = session();
    buffers(&session, 1);
    session.start().unwrap();

    let geometry = session.geometry();
    let old = frame(1, geometry);
    let new = frame(2, geometry);

    // frame 2 starts while frame 1's tail is still in flight
    let mut chunks = old[..10].to_vec();
    chunks.extend_from_slice(&new[..5]);
    chunks.extend_from_slice(&old[10..]);
    chunks.extend_from_slice(&new[5..]);
    manual.stream(&chunks, PACKETS);

    let buf = rx.try_recv().unwrap();
    assert_eq!(buf.state(), State::Done);
    assert!(buf.data().iter().all(|&b| b == 2));
    assert!(rx.try_recv().is_err());
}

#[test]
fn transient_errors_are_resubmitted() {
    let (manual, session, _rx) = session();
    session.start().unwrap();

    manual.complete(&[chunk(0, 0, Parity::Even, 0)], Status::Error(std::io::ErrorKind::Other));
    assert_eq!(manual.pending(), 16);
    assert_eq!(manual.submitted(), 17);
    assert!(!session.is_disconnected());
}

#[test]
fn device_removal_terminates_session() {
    let (manual, session, rx) = session();
    buffers(&session, 3);
    session.start().unwrap();

    manual.complete(&[], Status::DeviceGone);
    assert!(session.is_disconnected());
    assert_eq!(manual.pending(), 15);
    assert_eq!(session.queued(), 0);

    let flushed: Vec<FrameBuffer> = rx.try_iter().collect();
    assert_eq!(flushed.len(), 3);
    assert!(flushed.iter().all(|b| b.state() == State::Error));

    let size = session.geometry().frame_size();
    assert!(matches!(
        session.enqueue(FrameBuffer::new(9, size)),
        Err(Error::Disconnected)
    ));

    session.stop().unwrap();
    assert_eq!(manual.pending(), 0);
    assert!(matches!(session.start(), Err(Error::Disconnected)));
}

#[test]
fn sequence_restarts_with_each_stream() {
    let (manual, session, rx) = session();
    buffers(&session, 1);
    session.start().unwrap();

    let geometry = session.geometry();
    manual.stream(&frame(1, geometry), PACKETS);
    let buf = rx.try_recv().unwrap();
    assert_eq!(buf.meta().sequence, 0);

    session.stop().unwrap();
    session.enqueue(buf).unwrap();
    session.start().unwrap();

    manual.stream(&frame(2, geometry), PACKETS);
    let buf = rx.try_recv().unwrap();
    assert_eq!(buf.state(), State::Done);
    assert_eq!(buf.meta().sequence, 0);
}

#[test]
fn control_path_state_checks() {
    let (_manual, session, _rx) = session();
    assert!(matches!(session.stop(), Err(Error::NotStreaming)));

    session.start().unwrap();
    assert!(matches!(session.start(), Err(Error::Busy)));
    assert!(matches!(session.set_norm(Norm::Pal), Err(Error::Busy)));
    assert_eq!(session.norm(), Norm::Ntsc);
}

#[test]
fn norm_switch_resizes_frames() {
    let (_manual, session, _rx) = session();
    let ntsc = session.geometry().frame_size();

    session.set_norm(Norm::Pal).unwrap();
    assert_eq!(session.geometry().n_chunks, 432);
    assert_eq!(session.format().height, 576);

    let err = session.enqueue(FrameBuffer::new(0, ntsc)).unwrap_err();
    assert!(matches!(err, Error::BufferTooSmall { .. }));
    assert_eq!(session.queued(), 0);
}

#[test]
fn norm_growth_hands_back_small_buffers_and_keeps_streaming() {
    let (manual, session, rx) = session();
    let ntsc = session.geometry().frame_size();
    session.enqueue(FrameBuffer::new(0, ntsc)).unwrap();

    session.set_norm(Norm::Pal).unwrap();
    let evicted = rx.try_recv().unwrap();
    assert_eq!(evicted.index(), 0);
    assert_eq!(evicted.state(), State::Error);
    assert_eq!(session.queued(), 0);

    let geometry = session.geometry();
    session
        .enqueue(FrameBuffer::new(1, geometry.frame_size()))
        .unwrap();
    session.start().unwrap();

    for id in 0..5u8 {
        manual.stream(&frame(id, geometry), PACKETS);
        let buf = rx.try_recv().unwrap();
        assert_eq!(buf.index(), 1);
        assert_eq!(buf.state(), State::Done);
        assert_eq!(buf.meta().sequence, id as u32);
        session.enqueue(buf).unwrap();
    }
}

/// Completes one transfer per batch of `chunks`, in the batch order given by `order`
fn complete_batches(manual: &Manual, chunks: &[Vec<u8>], order: impl IntoIterator<Item = usize>) {
    let batches: Vec<&[Vec<u8>]> = chunks.chunks(PACKETS).collect();
    for i in order {
        manual.complete(batches[i], Status::Ok);
    }
}

#[test]
fn odd_field_overtaking_even_tail_still_completes() {
    let (manual, session, rx) = session();
    buffers(&session, 1);
    session.start().unwrap();

    let chunks = frame(6, session.geometry());
    // 45 batches per field, the last one carries the closing chunk
    assert_eq!(chunks.len(), 90 * PACKETS);
    let order = std::iter::once(0)
        .chain(45..89)
        .chain(1..45)
        .chain(std::iter::once(89));
    complete_batches(&manual, &chunks, order);

    let buf = rx.try_recv().unwrap();
    assert_eq!(buf.state(), State::Done);
    assert_eq!(buf.meta().sequence, 0);
    assert!(buf.data().iter().all(|&b| b == 6));
    assert_eq!(session.queued(), 0);
}

#[test]
fn shuffled_completions_reassemble_frame() {
    let (manual, session, rx) = session();
    buffers(&session, 2);
    session.start().unwrap();

    let geometry = session.geometry();
    let order = |skip: Option<usize>| {
        std::iter::once(0)
            .chain((0..88).map(|i| i * 37 % 88 + 1))
            .filter(move |&i| Some(i) != skip)
            .chain(std::iter::once(89))
    };

    complete_batches(&manual, &frame(1, geometry), order(None));
    let buf = rx.try_recv().unwrap();
    assert_eq!(buf.state(), State::Done);
    assert!(buf.data().iter().all(|&b| b == 1));

    complete_batches(&manual, &frame(2, geometry), order(Some(30)));
    let buf = rx.try_recv().unwrap();
    assert_eq!(buf.state(), State::Error);
    assert_eq!(buf.meta().sequence, 1);
    assert_eq!(session.queued(), 0);
}

#[test]
fn early_closing_chunk_does_not_stall_the_queue() {
    let (manual, session, rx) = session();
    buffers(&session, 2);
    session.start().unwrap();

    let geometry = session.geometry();
    let order = std::iter::once(0)
        .chain(std::iter::once(89))
        .chain(1..89);
    complete_batches(&manual, &frame(1, geometry), order);

    let first = rx.try_recv().unwrap();
    assert_eq!(first.state(), State::Error);
    assert_eq!(first.meta().sequence, 0);
    // the tail of frame 1 went into the next buffer without closing it
    assert!(rx.try_recv().is_err());
    assert_eq!(session.queued(), 1);

    manual.stream(&frame(2, geometry), PACKETS);
    let second = rx.try_recv().unwrap();
    assert_eq!(second.index(), 1);
    assert_eq!(second.state(), State::Done);
    assert_eq!(second.meta().sequence, 1);
    assert!(second.data().iter().all(|&b| b == 2));
}

#[test]
fn pal_frames_are_assembled() {
    let manual = Manual::new();
    let (tx, rx) = mpsc::channel();
    let config = Config::default().norm(Norm::Pal).transfers(4);
    let session = Session::with_config(manual.clone(), tx, config).unwrap();

    let geometry = session.geometry();
    session
        .enqueue(FrameBuffer::new(0, geometry.frame_size()))
        .unwrap();
    session.start().unwrap();
    assert_eq!(manual.pending(), 4);

    manual.stream(&frame(9, geometry), PACKETS);
    let buf = rx.try_recv().unwrap();
    assert_eq!(buf.state(), State::Done);
    assert_eq!(buf.data().len(), 720 * 576 * 2);
}

#[test]
fn failed_start_rolls_back() {
    let (manual, session, _rx) = session();
    manual.refuse_after(4);

    assert!(matches!(session.start(), Err(Error::Io(_))));
    assert!(!session.is_streaming());
    assert!(!manual.is_streaming());
    assert_eq!(manual.pending(), 0);
    assert_eq!(session.scheduler().outstanding(), 0);
}

#[test]
fn register_writes_pass_through() {
    let (manual, session, _rx) = session();
    session
        .write_registers(&[(0x0008, 0x0001), (0x01d0, 0x00ff)])
        .unwrap();
    assert_eq!(manual.registers(), vec![(0x0008, 0x0001), (0x01d0, 0x00ff)]);
}
