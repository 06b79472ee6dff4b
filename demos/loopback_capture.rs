use std::sync::mpsc;
use std::time::{Duration, Instant};

use tracing_subscriber::EnvFilter;
use usbtv::prelude::*;

fn main() -> usbtv::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let norm = Norm::Pal;
    let geometry = norm.geometry();

    // Capture 25 frames by default
    let count = 25;

    // Allocate 4 buffers by default
    let buffer_count = 4;

    // every 5th frame loses a chunk on the wire
    let source = TestPattern::new(geometry).skip_every(5);
    let transport = Loopback::with_workers(source, 2, Some(Duration::from_micros(125)));

    let (tx, rx) = mpsc::channel();
    let session = Session::with_config(transport, tx, Config::default().norm(norm))?;
    println!("Active format:\n{}", session.format());

    for i in 0..buffer_count {
        session.enqueue(FrameBuffer::new(i, geometry.frame_size()))?;
    }
    session.start()?;

    let start = Instant::now();
    let mut errored = 0;
    for _ in 0..count {
        let buf = match rx.recv_timeout(Duration::from_secs(5)) {
            Ok(buf) => buf,
            Err(_) => break,
        };
        if buf.state() == State::Error {
            errored += 1;
        }

        let meta = buf.meta();
        println!("Buffer");
        println!("  index     : {}", buf.index());
        println!("  state     : {}", buf.state());
        println!("  sequence  : {}", meta.sequence);
        println!("  timestamp : {}", meta.timestamp);
        println!("  flags     : {}", meta.flags);
        println!("  length    : {}", buf.data().len());

        session.enqueue(buf)?;
    }

    session.stop()?;

    println!();
    println!("FPS: {}", count as f64 / start.elapsed().as_secs_f64());
    println!("Errored: {}", errored);

    Ok(())
}
