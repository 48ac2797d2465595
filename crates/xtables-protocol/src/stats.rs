//! Client-side telemetry: the health classification and the
//! `ClientStatistics` record solicited by `INFORMATION`/`REGISTRY` updates.

use crate::codec;
use crate::error::DecodeError;

/// Coarse health tag derived from memory pressure and CPU load.
///
/// Memory ratio dominates; CPU only escalates within a band, never
/// downgrades a memory-driven verdict. `Unknown` is a local-only sentinel
/// for "not yet measured", never sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HealthStatus {
    Good = 0,
    Okay = 1,
    Stressed = 2,
    Overload = 3,
    Critical = 4,
    Unknown = 5,
}

impl HealthStatus {
    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => HealthStatus::Good,
            1 => HealthStatus::Okay,
            2 => HealthStatus::Stressed,
            3 => HealthStatus::Overload,
            4 => HealthStatus::Critical,
            5 => HealthStatus::Unknown,
            _ => return None,
        })
    }

    pub(crate) fn tag(self) -> u8 {
        self as u8
    }
}

/// Memory-usage ratio gates the tag; CPU load can only push it up within
/// the same ratio band, never down.
pub fn calculate_health(used_mb: f64, max_mb: f64, cpu_pct: f64) -> HealthStatus {
    if max_mb <= 0.0 {
        return HealthStatus::Unknown;
    }
    let ratio = used_mb / max_mb;
    if ratio <= 0.50 && cpu_pct < 50.0 {
        HealthStatus::Good
    } else if ratio <= 0.60 && cpu_pct < 70.0 {
        HealthStatus::Okay
    } else if ratio <= 0.70 && cpu_pct < 85.0 {
        HealthStatus::Stressed
    } else if ratio <= 0.85 && cpu_pct < 95.0 {
        HealthStatus::Overload
    } else {
        HealthStatus::Critical
    }
}

/// The snapshot reported to a peer that solicits telemetry. Field order is
/// the wire order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientStatistics {
    pub nano_time: u64,
    pub max_memory_mb: f64,
    pub used_memory_mb: f64,
    pub free_memory_mb: f64,
    pub cpu_load_pct: f64,
    pub processor_count: i32,
    pub thread_count: i32,
    pub host_ip: String,
    pub hostname: String,
    pub process_id: i32,
    pub runtime_name: String,
    pub runtime_version: String,
    pub client_version: String,
    pub health: HealthStatus,
    pub buffer_size: i32,
    pub max_buffer_size: i32,
    pub uuid: String,
}

pub fn encode_statistics(stats: &ClientStatistics) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(codec::encode_i64(stats.nano_time as i64));
    out.extend(codec::encode_f64(stats.max_memory_mb));
    out.extend(codec::encode_f64(stats.used_memory_mb));
    out.extend(codec::encode_f64(stats.free_memory_mb));
    out.extend(codec::encode_f64(stats.cpu_load_pct));
    out.extend(codec::encode_i32(stats.processor_count));
    out.extend(codec::encode_i32(stats.thread_count));
    out.extend(len_prefixed(&codec::encode_string(&stats.host_ip)));
    out.extend(len_prefixed(&codec::encode_string(&stats.hostname)));
    out.extend(codec::encode_i32(stats.process_id));
    out.extend(len_prefixed(&codec::encode_string(&stats.runtime_name)));
    out.extend(len_prefixed(&codec::encode_string(&stats.runtime_version)));
    out.extend(len_prefixed(&codec::encode_string(&stats.client_version)));
    out.push(stats.health.tag());
    out.extend(codec::encode_i32(stats.buffer_size));
    out.extend(codec::encode_i32(stats.max_buffer_size));
    out.extend(len_prefixed(&codec::encode_string(&stats.uuid)));
    out
}

fn len_prefixed(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + bytes.len());
    out.extend((bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
    out
}

pub fn decode_statistics(data: &[u8]) -> Result<ClientStatistics, DecodeError> {
    let mut buf = data;

    let nano_time = take_fixed(&mut buf, 8, "nano_time")?;
    let nano_time = i64::from_be_bytes(nano_time.try_into().unwrap()) as u64;
    let max_memory_mb = codec::decode_f64(take_fixed(&mut buf, 8, "max_memory_mb")?)?;
    let used_memory_mb = codec::decode_f64(take_fixed(&mut buf, 8, "used_memory_mb")?)?;
    let free_memory_mb = codec::decode_f64(take_fixed(&mut buf, 8, "free_memory_mb")?)?;
    let cpu_load_pct = codec::decode_f64(take_fixed(&mut buf, 8, "cpu_load_pct")?)?;
    let processor_count = codec::decode_i32(take_fixed(&mut buf, 4, "processor_count")?)?;
    let thread_count = codec::decode_i32(take_fixed(&mut buf, 4, "thread_count")?)?;
    let host_ip = take_string(&mut buf, "host_ip")?;
    let hostname = take_string(&mut buf, "hostname")?;
    let process_id = codec::decode_i32(take_fixed(&mut buf, 4, "process_id")?)?;
    let runtime_name = take_string(&mut buf, "runtime_name")?;
    let runtime_version = take_string(&mut buf, "runtime_version")?;
    let client_version = take_string(&mut buf, "client_version")?;
    let health_tag = *buf.first().ok_or(DecodeError::Truncated { field: "health" })?;
    buf = &buf[1..];
    let health = HealthStatus::from_tag(health_tag).ok_or(DecodeError::UnknownTag {
        field: "health",
        tag: health_tag,
    })?;
    let buffer_size = codec::decode_i32(take_fixed(&mut buf, 4, "buffer_size")?)?;
    let max_buffer_size = codec::decode_i32(take_fixed(&mut buf, 4, "max_buffer_size")?)?;
    let uuid = take_string(&mut buf, "uuid")?;

    Ok(ClientStatistics {
        nano_time,
        max_memory_mb,
        used_memory_mb,
        free_memory_mb,
        cpu_load_pct,
        processor_count,
        thread_count,
        host_ip,
        hostname,
        process_id,
        runtime_name,
        runtime_version,
        client_version,
        health,
        buffer_size,
        max_buffer_size,
        uuid,
    })
}

fn take_fixed<'a>(buf: &mut &'a [u8], n: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
    if buf.len() < n {
        return Err(DecodeError::Truncated { field });
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

fn take_string(buf: &mut &[u8], field: &'static str) -> Result<String, DecodeError> {
    let len_bytes = take_fixed(buf, 4, field)?;
    let len = u32::from_be_bytes(len_bytes.try_into().unwrap()) as usize;
    let bytes = take_fixed(buf, len, field)?;
    codec::decode_string(bytes)
}
