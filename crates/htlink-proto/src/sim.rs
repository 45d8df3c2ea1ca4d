//! Simulated heat pump for tests and demos.
//!
//! [`SimDevice`] holds register contents plus fault-injection knobs and
//! serves the real frame protocol on a loopback `TcpListener`, so sessions
//! under test go through the same `TcpConnector` as production code.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::command::{Bank, Register};
use crate::frame::{Frame, FrameCodec, encode_frame};
use crate::transport::TransportConfig;

#[derive(Debug, Default)]
struct Behaviour {
    registers: BTreeMap<Register, i64>,
    omitted: HashSet<u16>,
    faults: HashMap<Register, String>,
    garbled: HashSet<Register>,
    bulk_fault: Option<String>,
    clamp: HashMap<Register, (i64, i64)>,
    clock: Option<NaiveDateTime>,
}

#[derive(Debug, Default)]
struct Shared {
    behaviour: Mutex<Behaviour>,
    reject_login: AtomicBool,
    latency_ms: AtomicU64,
    connections: AtomicUsize,
    requests: AtomicUsize,
    logins: AtomicUsize,
    logouts: AtomicUsize,
    writes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: Mutex<Vec<String>>,
}

/// Handle to a simulated device. Cloning shares the same state.
#[derive(Debug, Clone, Default)]
pub struct SimDevice {
    shared: Arc<Shared>,
}

impl SimDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn behaviour(&self) -> MutexGuard<'_, Behaviour> {
        self.shared
            .behaviour
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    // ── Configuration ───────────────────────────────────────────────

    #[must_use]
    pub fn with_register(self, register: Register, raw: i64) -> Self {
        self.set_register(register, raw);
        self
    }

    pub fn set_register(&self, register: Register, raw: i64) {
        self.behaviour().registers.insert(register, raw);
    }

    pub fn register(&self, register: Register) -> Option<i64> {
        self.behaviour().registers.get(&register).copied()
    }

    /// Leave `number` out of bulk responses (unsupported on this model).
    pub fn omit_from_bulk(&self, number: u16) {
        self.behaviour().omitted.insert(number);
    }

    /// Answer requests for `register` with `ERR,<code>;`.
    pub fn fail_register(&self, register: Register, code: &str) {
        self.behaviour().faults.insert(register, code.to_owned());
    }

    pub fn clear_fault(&self, register: Register) {
        self.behaviour().faults.remove(&register);
    }

    /// Answer requests for `register` with a frame whose checksum is wrong.
    pub fn garble_register(&self, register: Register) {
        self.behaviour().garbled.insert(register);
    }

    /// Answer every bulk request with `ERR,<code>;`, or stop doing so.
    pub fn fail_bulk(&self, code: Option<&str>) {
        self.behaviour().bulk_fault = code.map(str::to_owned);
    }

    /// Clamp writes to `register` into `min..=max` and echo the clamped value.
    pub fn clamp_writes(&self, register: Register, min: i64, max: i64) {
        self.behaviour().clamp.insert(register, (min, max));
    }

    pub fn set_clock(&self, datetime: NaiveDateTime) {
        self.behaviour().clock = Some(datetime);
    }

    pub fn reject_login(&self, reject: bool) {
        self.shared.reject_login.store(reject, Ordering::SeqCst);
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.shared.latency_ms.store(ms, Ordering::SeqCst);
    }

    // ── Observation ─────────────────────────────────────────────────

    /// Number of TCP connections accepted so far.
    pub fn connections(&self) -> usize {
        self.shared.connections.load(Ordering::SeqCst)
    }

    /// Number of request frames received so far.
    pub fn requests(&self) -> usize {
        self.shared.requests.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> usize {
        self.shared.logins.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.shared.logouts.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.shared.writes.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were being processed at the same
    /// time, across all connections.
    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    /// Request payloads in arrival order.
    pub fn request_log(&self) -> Vec<String> {
        self.shared
            .log
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    // ── Serving ─────────────────────────────────────────────────────

    /// Bind a loopback listener and serve connections in the background.
    pub async fn serve(&self) -> std::io::Result<SimServer> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;
        let device = self.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                device.shared.connections.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(device.clone().handle_connection(stream));
            }
        });
        debug!(%addr, "simulated device listening");
        Ok(SimServer { addr, task })
    }

    async fn handle_connection(self, stream: TcpStream) {
        let mut framed = Framed::new(stream, FrameCodec);
        let mut logged_in = false;

        while let Some(Ok(frame)) = framed.next().await {
            let payload = String::from_utf8_lossy(&frame.payload).into_owned();
            self.shared.requests.fetch_add(1, Ordering::SeqCst);
            let now = self.shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.shared.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.shared
                .log
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(payload.clone());

            let latency = self.shared.latency_ms.load(Ordering::SeqCst);
            if latency > 0 {
                tokio::time::sleep(Duration::from_millis(latency)).await;
            }

            let reply = self.respond(&payload, &mut logged_in);
            let sent = match reply {
                Reply::Text(text) => framed.send(Frame::response(text)).await.is_ok(),
                Reply::Garbled(text) => match encode_frame(&Frame::response(text)) {
                    Ok(mut bytes) => {
                        if let Some(last) = bytes.last_mut() {
                            *last ^= 0xFF;
                        }
                        framed.get_mut().write_all(&bytes).await.is_ok()
                    }
                    Err(_) => false,
                },
            };
            self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
            if !sent {
                break;
            }
        }
    }

    fn respond(&self, payload: &str, logged_in: &mut bool) -> Reply {
        let body = payload.strip_suffix(';').unwrap_or(payload);
        let mut tokens = body.split(',');
        let command = tokens.next().unwrap_or_default();
        let args: Vec<&str> = tokens.collect();

        match command {
            "LIN" => {
                if self.shared.reject_login.load(Ordering::SeqCst) {
                    return Reply::Text("ERR,1;".into());
                }
                self.shared.logins.fetch_add(1, Ordering::SeqCst);
                *logged_in = true;
                Reply::Text("OK;".into())
            }
            _ if !*logged_in => Reply::Text("ERR,2;".into()),
            "LOUT" => {
                self.shared.logouts.fetch_add(1, Ordering::SeqCst);
                *logged_in = false;
                Reply::Text("OK;".into())
            }
            "SP" | "MP" => {
                let bank = if command == "SP" { Bank::Sp } else { Bank::Mp };
                self.register_request(bank, &args)
            }
            "MR" => self.bulk_request(&args),
            "CLK" => self.clock_request(&args),
            _ => Reply::Text("ERR,3;".into()),
        }
    }

    fn register_request(&self, bank: Bank, args: &[&str]) -> Reply {
        let field = |key: &str| {
            args.iter()
                .find_map(|a| a.strip_prefix(key).and_then(|v| v.strip_prefix('=')))
        };
        let Some(number) = field("NR").and_then(|n| n.parse::<u16>().ok()) else {
            return Reply::Text("ERR,4;".into());
        };
        let register = Register { bank, number };

        let mut behaviour = self.behaviour();
        if let Some(code) = behaviour.faults.get(&register) {
            return Reply::Text(format!("ERR,{code};"));
        }
        if !behaviour.registers.contains_key(&register) {
            return Reply::Text("ERR,5;".into());
        }

        if let Some(value) = field("VAL") {
            let Ok(mut raw) = value.parse::<i64>() else {
                return Reply::Text("ERR,4;".into());
            };
            if let Some((min, max)) = behaviour.clamp.get(&register) {
                raw = raw.clamp(*min, *max);
            }
            behaviour.registers.insert(register, raw);
            self.shared.writes.fetch_add(1, Ordering::SeqCst);
        }

        let raw = behaviour.registers.get(&register).copied().unwrap_or_default();
        let text = format!("{register},VAL={raw};");
        if behaviour.garbled.contains(&register) {
            Reply::Garbled(text)
        } else {
            Reply::Text(text)
        }
    }

    fn bulk_request(&self, args: &[&str]) -> Reply {
        let behaviour = self.behaviour();
        if let Some(code) = &behaviour.bulk_fault {
            return Reply::Text(format!("ERR,{code};"));
        }
        let mut out = String::from("MA");
        for number in args.iter().filter_map(|a| a.parse::<u16>().ok()) {
            if behaviour.omitted.contains(&number) {
                continue;
            }
            if let Some(raw) = behaviour.registers.get(&Register::mp(number)) {
                out.push_str(&format!(",{number}={raw}"));
            }
        }
        out.push(';');
        Reply::Text(out)
    }

    fn clock_request(&self, args: &[&str]) -> Reply {
        let mut behaviour = self.behaviour();
        if !args.is_empty() {
            let field = |key: &str| {
                args.iter()
                    .find_map(|a| a.strip_prefix(key).and_then(|v| v.strip_prefix('=')))
            };
            let parsed = field("DA").zip(field("TI")).and_then(|(da, ti)| {
                NaiveDateTime::parse_from_str(&format!("{da} {ti}"), "%d.%m.%y %H:%M:%S").ok()
            });
            let Some(datetime) = parsed else {
                return Reply::Text("ERR,4;".into());
            };
            behaviour.clock = Some(datetime);
            self.shared.writes.fetch_add(1, Ordering::SeqCst);
        }
        let clock = behaviour.clock.unwrap_or_else(default_clock);
        Reply::Text(format!(
            "CLK,DA={},TI={},WD={};",
            clock.format("%d.%m.%y"),
            clock.format("%H:%M:%S"),
            clock.weekday().number_from_monday()
        ))
    }
}

fn default_clock() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap_or_default()
}

enum Reply {
    Text(String),
    Garbled(String),
}

/// A running simulated device. Dropping it stops accepting connections.
#[derive(Debug)]
pub struct SimServer {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl SimServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Transport settings pointing at this server with the given timeout.
    pub fn transport_config(&self, timeout: Duration) -> TransportConfig {
        TransportConfig::new(self.addr.ip().to_string(), self.addr.port()).with_timeout(timeout)
    }
}

impl Drop for SimServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}
