//! Event loop tests against a real shell standing in for the debug server.

mod dispatch_test;

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use debugger_bootstrap::bootstrap::{Bootstrapper, FsProbe};
use debugger_bootstrap::debugger::{DebuggerInstance, StopTiming};
use debugger_bootstrap::protocol::{next_frame, FrameStatus, PacketType, SubscriberUpdate};
use debugger_bootstrap::server::{DispatchSettings, EventDispatcher};

pub type Dispatcher = EventDispatcher<FsProbe, DebuggerInstance>;

/// A dispatcher whose "debugger" runs `script` with the program as `$0`.
pub fn dispatcher(script: &str) -> Dispatcher {
    let debugger = DebuggerInstance::new("/bin/sh")
        .with_args(["-c", script])
        .with_stop_timing(StopTiming {
            poll_interval: Duration::from_millis(5),
            grace_period: Duration::from_millis(200),
        });
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    EventDispatcher::new(listener, Bootstrapper::new(FsProbe, debugger))
        .unwrap()
        .with_settings(DispatchSettings {
            poll_timeout: Duration::from_millis(20),
            read_chunk_size: 256,
            ..DispatchSettings::default()
        })
}

/// A subscribed connection read without blocking.
pub struct Subscriber {
    stream: TcpStream,
    buffer: Vec<u8>,
    pub seen: Vec<SubscriberUpdate>,
}

impl Subscriber {
    pub fn connect(address: SocketAddr) -> Self {
        let mut stream = TcpStream::connect(address).unwrap();
        stream.write_all(&[0x01, 0x01]).unwrap();
        stream.set_nonblocking(true).unwrap();
        Self {
            stream,
            buffer: Vec::new(),
            seen: Vec::new(),
        }
    }

    fn drain(&mut self) {
        let mut chunk = [0u8; 1024];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => panic!("subscriber read failed: {e}"),
            }
        }

        while let FrameStatus::Complete(frame) = next_frame(&self.buffer) {
            assert_eq!(frame.kind, PacketType::SubscribeResponse);
            let update = SubscriberUpdate::from_json(frame.payload_str().unwrap()).unwrap();
            let consumed = frame.consumed;
            self.seen.push(update);
            self.buffer.drain(..consumed);
        }
    }

    /// Tags received so far, in order.
    pub fn tags(&self) -> Vec<&str> {
        self.seen.iter().map(|update| update.tag.as_str()).collect()
    }

    pub fn count(&self, tag: &str) -> usize {
        self.seen.iter().filter(|update| update.tag == tag).count()
    }

    /// Concatenated messages carrying `tag`.
    pub fn text(&self, tag: &str) -> String {
        self.seen
            .iter()
            .filter(|update| update.tag == tag)
            .map(|update| update.message.as_str())
            .collect()
    }
}

/// Run the loop until `done` holds for what the subscriber has seen, or
/// five seconds pass.
pub fn pump_until(
    dispatcher: &mut Dispatcher,
    subscriber: &mut Subscriber,
    done: impl Fn(&Subscriber) -> bool,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        dispatcher.poll_once().unwrap();
        subscriber.drain();
        if done(subscriber) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
    }
}

/// Run the loop for a fixed number of iterations.
pub fn pump(dispatcher: &mut Dispatcher, subscriber: &mut Subscriber, iterations: usize) {
    for _ in 0..iterations {
        dispatcher.poll_once().unwrap();
        subscriber.drain();
    }
}

/// Send raw bytes on a fresh connection and close it.
pub fn send(address: SocketAddr, bytes: &[u8]) {
    let mut stream = TcpStream::connect(address).unwrap();
    stream.write_all(bytes).unwrap();
}
