//! In-process memcached stand-in speaking just enough of both protocols for the tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub const VERSION: &str = "1.6.21-mock";

struct Item {
    value: Vec<u8>,
    flags: u32,
    expires: Option<Instant>,
}

impl Item {
    fn live(&self) -> bool {
        self.expires.map_or(true, |t| Instant::now() < t)
    }
}

fn deadline(expiration: u32) -> Option<Instant> {
    match expiration {
        0 => None,
        secs => Some(Instant::now() + Duration::from_secs(u64::from(secs))),
    }
}

struct Store {
    items: Mutex<HashMap<String, Item>>,
    max_value_size: usize,
    slow_delay: Duration,
}

impl Store {
    fn get(&self, key: &str) -> Option<(Vec<u8>, u32)> {
        if key.starts_with("slow") {
            thread::sleep(self.slow_delay);
        }
        let mut items = self.items.lock().unwrap();
        match items.get(key) {
            Some(item) if item.live() => Some((item.value.clone(), item.flags)),
            Some(_) => {
                items.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: Vec<u8>, flags: u32, expiration: u32) -> bool {
        if value.len() > self.max_value_size {
            return false;
        }
        let item = Item {
            value,
            flags,
            expires: deadline(expiration),
        };
        self.items.lock().unwrap().insert(key.to_string(), item);
        true
    }

    fn delete(&self, key: &str) -> bool {
        self.items.lock().unwrap().remove(key).map_or(false, |item| item.live())
    }

    fn touch(&self, key: &str, expiration: u32) -> bool {
        match self.items.lock().unwrap().get_mut(key) {
            Some(item) if item.live() => {
                item.expires = deadline(expiration);
                true
            }
            _ => false,
        }
    }

    fn flush(&self) {
        self.items.lock().unwrap().clear();
    }
}

pub struct MockServer {
    addr: SocketAddr,
}

impl MockServer {
    pub fn start() -> MockServer {
        MockServer::with_store(1024 * 1024, Duration::ZERO)
    }

    /// A server that refuses values longer than `max_value_size` bytes.
    pub fn with_max_value_size(max_value_size: usize) -> MockServer {
        MockServer::with_store(max_value_size, Duration::ZERO)
    }

    /// A server that waits `delay` before answering a get of any key starting with `slow`.
    pub fn with_slow_keys(delay: Duration) -> MockServer {
        MockServer::with_store(1024 * 1024, delay)
    }

    fn with_store(max_value_size: usize, slow_delay: Duration) -> MockServer {
        let store = Arc::new(Store {
            items: Mutex::new(HashMap::new()),
            max_value_size,
            slow_delay,
        });
        MockServer::listen(move |stream| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let _ = serve(stream, &store);
            });
        })
    }

    /// A server that accepts connections and immediately hangs up.
    pub fn hanging_up() -> MockServer {
        MockServer::listen(drop)
    }

    fn listen<F: Fn(TcpStream) + Send + 'static>(on_accept: F) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming() {
                match stream {
                    Ok(stream) => on_accept(stream),
                    Err(_) => break,
                }
            }
        });
        MockServer { addr }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self) -> String {
        format!("memcache://{}?connect_timeout=1&timeout=2", self.addr)
    }

    pub fn url_with_timeout(&self, timeout: &str) -> String {
        format!("memcache://{}?connect_timeout=1&timeout={}", self.addr, timeout)
    }

    pub fn ascii_url(&self) -> String {
        format!("{}&protocol=ascii", self.url())
    }
}

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn serve(stream: TcpStream, store: &Store) -> io::Result<()> {
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    loop {
        let first = match reader.fill_buf()? {
            [] => return Ok(()),
            buf => buf[0],
        };
        if first == 0x80 {
            serve_binary(&mut reader, &mut writer, store)?;
        } else {
            serve_ascii(&mut reader, &mut writer, store)?;
        }
        writer.flush()?;
    }
}

fn be_u16(b: &[u8]) -> u16 {
    u16::from_be_bytes([b[0], b[1]])
}

fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn respond<W: Write>(w: &mut W, opcode: u8, status: u16, opaque: &[u8], extras: &[u8], value: &[u8]) -> io::Result<()> {
    let mut packet = vec![0x81, opcode, 0, 0, extras.len() as u8, 0];
    packet.extend_from_slice(&status.to_be_bytes());
    packet.extend_from_slice(&((extras.len() + value.len()) as u32).to_be_bytes());
    packet.extend_from_slice(opaque);
    packet.extend_from_slice(&[0; 8]);
    packet.extend_from_slice(extras);
    packet.extend_from_slice(value);
    w.write_all(&packet)
}

fn serve_binary<R: Read, W: Write>(r: &mut R, w: &mut W, store: &Store) -> io::Result<()> {
    let mut header = [0u8; 24];
    r.read_exact(&mut header)?;
    let opcode = header[1];
    let key_length = usize::from(be_u16(&header[2..4]));
    let extras_length = usize::from(header[4]);
    let mut body = vec![0u8; be_u32(&header[8..12]) as usize];
    r.read_exact(&mut body)?;
    let opaque = &header[12..16];

    let extras = &body[..extras_length];
    let key = String::from_utf8_lossy(&body[extras_length..extras_length + key_length]).into_owned();
    let value = &body[extras_length + key_length..];

    match opcode {
        0x00 => match store.get(&key) {
            Some((value, flags)) => respond(w, opcode, 0, opaque, &flags.to_be_bytes(), &value),
            None => respond(w, opcode, 0x01, opaque, &[], b"Not found"),
        },
        0x01 => {
            if store.set(&key, value.to_vec(), be_u32(&extras[0..4]), be_u32(&extras[4..8])) {
                respond(w, opcode, 0, opaque, &[], &[])
            } else {
                respond(w, opcode, 0x03, opaque, &[], b"Too large.")
            }
        }
        0x04 => match store.delete(&key) {
            true => respond(w, opcode, 0, opaque, &[], &[]),
            false => respond(w, opcode, 0x01, opaque, &[], b"Not found"),
        },
        0x08 => {
            store.flush();
            respond(w, opcode, 0, opaque, &[], &[])
        }
        0x0b => respond(w, opcode, 0, opaque, &[], VERSION.as_bytes()),
        0x1c => match store.touch(&key, be_u32(&extras[0..4])) {
            true => respond(w, opcode, 0, opaque, &[], &[]),
            false => respond(w, opcode, 0x01, opaque, &[], b"Not found"),
        },
        _ => respond(w, opcode, 0x81, opaque, &[], b"Unknown command"),
    }
}

fn serve_ascii<R: BufRead, W: Write>(r: &mut R, w: &mut W, store: &Store) -> io::Result<()> {
    let mut line = String::new();
    if r.read_line(&mut line)? == 0 {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    let parts: Vec<&str> = line.trim_end().split(' ').collect();
    let number = |i: usize| parts.get(i).and_then(|s| s.parse::<u32>().ok()).unwrap_or(0);

    match parts[0] {
        "get" => {
            if let Some((value, flags)) = store.get(parts[1]) {
                write!(w, "VALUE {} {} {}\r\n", parts[1], flags, value.len())?;
                w.write_all(&value)?;
                w.write_all(b"\r\n")?;
            }
            w.write_all(b"END\r\n")
        }
        "set" => {
            let mut data = vec![0u8; number(4) as usize + 2];
            r.read_exact(&mut data)?;
            data.truncate(data.len() - 2);
            if store.set(parts[1], data, number(2), number(3)) {
                w.write_all(b"STORED\r\n")
            } else {
                w.write_all(b"SERVER_ERROR object too large for cache\r\n")
            }
        }
        "delete" => match store.delete(parts[1]) {
            true => w.write_all(b"DELETED\r\n"),
            false => w.write_all(b"NOT_FOUND\r\n"),
        },
        "touch" => match store.touch(parts[1], number(2)) {
            true => w.write_all(b"TOUCHED\r\n"),
            false => w.write_all(b"NOT_FOUND\r\n"),
        },
        "version" => write!(w, "VERSION {}\r\n", VERSION),
        "flush_all" => {
            store.flush();
            w.write_all(b"OK\r\n")
        }
        _ => w.write_all(b"ERROR\r\n"),
    }
}
