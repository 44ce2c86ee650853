/*!
Transmit scheduler and receive thread.

Two threads share the link:
1. Transmit thread: a fixed tick pulls at most one frame from the priority
   queue and writes it to the port
2. Receive thread: bytes from the port -> frame sync engine -> telemetry
   channel

The queue is the only shared state; its lock is never held across I/O.
*/

use crate::config::TransportConfig;
use crate::frame_sync::{FrameSyncEngine, SyncState, SyncStats};
use crossbeam_channel::{bounded, tick, Receiver, Sender, TrySendError};
use mcu_link::protocol::FRAME_SIZE;
use mcu_link::{Commander, Frame, LinkError, PriorityQueue, Result, Telemetry};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Back-off after a hard read error, so an unplugged adapter doesn't spin
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Transmit-side counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxStats {
    pub frames_sent: u64,
    pub partial_writes: u64,
    pub write_errors: u64,
}

/// Receive-side counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RxStats {
    pub bytes_read: u64,
    pub read_errors: u64,
    pub telemetry_dropped: u64,
    pub sync: SyncStats,
}

/// Write one whole frame
///
/// A short first write is reported and the rest of the frame is pushed out
/// immediately, so the MCU never sees a torn frame. The frame is not resent.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame, stats: &mut TxStats) -> Result<()> {
    let bytes = frame.as_bytes();
    let written = loop {
        match writer.write(bytes) {
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            result => break result?,
        }
    };

    if written < FRAME_SIZE {
        let partial = LinkError::PartialWrite {
            written,
            expected: FRAME_SIZE,
        };
        warn!("{}, completing frame [{}]", partial, frame);
        stats.partial_writes += 1;
        writer.write_all(&bytes[written..])?;
    }

    writer.flush()?;
    stats.frames_sent += 1;
    Ok(())
}

/// One scheduler tick: send the next queued frame, if any
pub fn transmit_tick<W: Write>(
    queue: &PriorityQueue,
    writer: &mut W,
    stats: &mut TxStats,
) -> Result<Option<Frame>> {
    let Some(frame) = queue.dequeue_next() else {
        return Ok(None);
    };

    if let Err(e) = write_frame(writer, &frame, stats) {
        stats.write_errors += 1;
        return Err(e);
    }
    Ok(Some(frame))
}

/// Handles to the running link threads
pub struct LinkHandles {
    pub telemetry: Receiver<Telemetry>,
    tx_handle: JoinHandle<TxStats>,
    rx_handle: JoinHandle<RxStats>,
}

impl LinkHandles {
    /// Wait for both threads to finish
    pub fn join(self) -> Result<(TxStats, RxStats)> {
        let tx = self
            .tx_handle
            .join()
            .map_err(|_| LinkError::ThreadPanic("transmit"))?;
        let rx = self
            .rx_handle
            .join()
            .map_err(|_| LinkError::ThreadPanic("receive"))?;
        Ok((tx, rx))
    }
}

/// The host side of the MCU link
pub struct McuLink {
    config: TransportConfig,
    queue: Arc<PriorityQueue>,
    commander: Commander,
    running: Arc<AtomicBool>,
    started: AtomicBool,
}

impl McuLink {
    /// Create a new link with an empty queue
    pub fn new(config: TransportConfig) -> Self {
        let queue = Arc::new(PriorityQueue::new(config.queue_capacities));
        let commander = Commander::new(Arc::clone(&queue));

        Self {
            config,
            queue,
            commander,
            running: Arc::new(AtomicBool::new(true)),
            started: AtomicBool::new(false),
        }
    }

    /// Submission handle for application code
    pub fn commander(&self) -> Commander {
        self.commander.clone()
    }

    pub fn queue(&self) -> &Arc<PriorityQueue> {
        &self.queue
    }

    /// Get a reference to the running flag for external control
    pub fn get_running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Start the transmit and receive threads on the given port halves
    ///
    /// A link is started at most once; a second transmit thread on the same
    /// queue would break the one-frame-per-tick pacing.
    pub fn start<R, W>(&self, reader: R, writer: W) -> Result<LinkHandles>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        if self.config.tx_interval_ms == 0 {
            return Err(LinkError::config("tx_interval_ms must be at least 1"));
        }
        if self.config.telemetry_buffer_size == 0 {
            return Err(LinkError::config("telemetry_buffer_size must be at least 1"));
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(LinkError::AlreadyStarted);
        }

        if self.config.send_init_sequence {
            info!("📤 Queueing MCU initialization sequence");
            self.commander.send_init_sequence();
        }

        let (telemetry_tx, telemetry_rx) = bounded::<Telemetry>(self.config.telemetry_buffer_size);

        let queue = Arc::clone(&self.queue);
        let running_tx = Arc::clone(&self.running);
        let interval = self.config.tx_interval();
        let log_tx_frames = self.config.log_tx_frames;

        let tx_handle = thread::Builder::new()
            .name("mcu-tx".to_string())
            .spawn(move || Self::transmit_thread(queue, writer, running_tx, interval, log_tx_frames))?;

        let running_rx = Arc::clone(&self.running);
        let idle_sleep = self.config.rx_idle_sleep();

        let rx_handle = thread::Builder::new()
            .name("mcu-rx".to_string())
            .spawn(move || Self::receive_thread(reader, telemetry_tx, running_rx, idle_sleep))?;

        info!(
            "✅ MCU link started (tick {:?}, queue capacities {:?})",
            interval, self.config.queue_capacities
        );

        Ok(LinkHandles {
            telemetry: telemetry_rx,
            tx_handle,
            rx_handle,
        })
    }

    /// Block until every queued frame has been sent or the timeout expires
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.queue.is_empty() {
            if Instant::now() >= deadline || !self.running.load(Ordering::SeqCst) {
                return false;
            }
            thread::sleep(self.config.tx_interval());
        }
        // The last frame may still be mid-write on the transmit thread.
        thread::sleep(self.config.tx_interval() * 2);
        true
    }

    /// Transmit thread - one frame per tick, strict priority
    fn transmit_thread<W: Write>(
        queue: Arc<PriorityQueue>,
        mut writer: W,
        running: Arc<AtomicBool>,
        interval: Duration,
        log_tx_frames: bool,
    ) -> TxStats {
        let ticker = tick(interval);
        let mut stats = TxStats::default();

        info!("📝 Transmit thread started");

        while running.load(Ordering::SeqCst) {
            if ticker.recv().is_err() {
                break;
            }

            match transmit_tick(&queue, &mut writer, &mut stats) {
                Ok(Some(frame)) => {
                    if log_tx_frames {
                        info!("UART TX [{}]", frame);
                    } else {
                        debug!("UART TX [{}]", frame);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("❌ UART write failed, frame lost: {}", e);
                }
            }
        }

        let queue_stats = queue.stats();
        info!("📊 Transmit thread final stats:");
        info!("   Frames sent: {}", stats.frames_sent);
        info!("   Partial writes: {}", stats.partial_writes);
        info!("   Write errors: {}", stats.write_errors);
        info!("   Frames dropped by overflow: {}", queue_stats.dropped);
        info!("   Frames left in queue: {}", queue.total_len());

        stats
    }

    /// Receive thread - feeds the sync engine and publishes telemetry
    fn receive_thread<R: Read>(
        mut reader: R,
        telemetry_tx: Sender<Telemetry>,
        running: Arc<AtomicBool>,
        idle_sleep: Duration,
    ) -> RxStats {
        let mut engine = FrameSyncEngine::new();
        let mut stats = RxStats::default();
        let mut buffer = [0u8; 64];
        let mut consumer_gone = false;

        info!("📥 Receive thread started");

        while running.load(Ordering::SeqCst) {
            match reader.read(&mut buffer) {
                Ok(0) => thread::sleep(idle_sleep),
                Ok(n) => {
                    stats.bytes_read += n as u64;
                    engine.feed(&buffer[..n], |telemetry| {
                        debug!("IMU heading {:.2}°", telemetry.angle);
                        match telemetry_tx.try_send(telemetry) {
                            Ok(()) => {}
                            Err(TrySendError::Full(_)) => {
                                stats.telemetry_dropped += 1;
                                warn!("Telemetry channel full, dropping sample");
                            }
                            Err(TrySendError::Disconnected(_)) => {
                                if !consumer_gone {
                                    debug!("Telemetry consumer gone, discarding samples");
                                    consumer_gone = true;
                                }
                            }
                        }
                    });
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    thread::sleep(idle_sleep);
                }
                Err(e) => {
                    stats.read_errors += 1;
                    error!("UART read error: {}", e);
                    thread::sleep(READ_ERROR_BACKOFF);
                }
            }
        }

        stats.sync = engine.stats();

        if engine.state() == SyncState::Syncing {
            warn!("⚠️ Incomplete frame at shutdown: {} bytes", engine.current_buffer().len());
        }

        info!("📊 Receive thread final stats:");
        info!("   Bytes read: {}", stats.bytes_read);
        info!("   Frames decoded: {}", stats.sync.frames_decoded);
        info!("   Checksum errors: {}", stats.sync.checksum_errors);
        info!("   Framing desyncs: {}", stats.sync.framing_desyncs);
        info!("   Bytes discarded: {}", stats.sync.bytes_discarded);
        info!("   Telemetry dropped: {}", stats.telemetry_dropped);
        info!("   Read errors: {}", stats.read_errors);

        stats
    }
}
