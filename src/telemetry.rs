//! Responds to server-solicited INFORMATION/REGISTRY events with a
//! client-statistics record over the Push transport.
//!
//! System stats come from `sysinfo`, refreshed per-solicitation rather
//! than polled continuously in the background — solicitations are
//! infrequent, and a continuous poll task would outlive its usefulness.

use crate::router::Solicitation;
use crate::transport::PushTransport;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use sysinfo::{Pid, System};
use tracing::warn;
use xtables_protocol::{calculate_health, stats, Command, Message, ValueType};

pub struct TelemetryResponder;

impl TelemetryResponder {
    /// Spawn the responder task, or do nothing in ghost mode: the
    /// responder is absent and no solicitation reply is sent.
    pub fn spawn(
        ghost_mode: bool,
        mut solicitations: tokio::sync::mpsc::UnboundedReceiver<Solicitation>,
        push: Arc<PushTransport>,
        client_version: String,
        buffer_occupancy: impl Fn() -> usize + Send + 'static,
        max_buffer_size: usize,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if ghost_mode {
            return None;
        }
        Some(tokio::spawn(async move {
            let mut system = System::new_all();
            while let Some(solicitation) = solicitations.recv().await {
                system.refresh_all();
                let snapshot = build_statistics(
                    &system,
                    &client_version,
                    buffer_occupancy(),
                    max_buffer_size,
                );
                let encoded = stats::encode_statistics(&snapshot);
                let command = match solicitation.category {
                    xtables_protocol::Category::Information => Command::Information,
                    xtables_protocol::Category::Registry => Command::Registry,
                    _ => unreachable!("intake only forwards solicitation categories"),
                };
                let message = Message::new(command)
                    .with_id(solicitation.id)
                    .with_value(encoded, ValueType::Bytes);
                let frame = xtables_protocol::codec::encode_message(&message);
                if !push.send(frame) {
                    warn!("failed to enqueue telemetry reply on push transport");
                }
            }
        }))
    }
}

fn build_statistics(
    system: &System,
    client_version: &str,
    buffer_size: usize,
    max_buffer_size: usize,
) -> stats::ClientStatistics {
    let pid = sysinfo::get_current_pid().ok();
    let (used_mb, process_id) = pid
        .and_then(|p| system.process(p))
        .map(|proc| (proc.memory() as f64 / (1024.0 * 1024.0), pid_as_i32(pid)))
        .unwrap_or((0.0, -1));

    let max_memory_mb = system.total_memory() as f64 / (1024.0 * 1024.0);
    let free_memory_mb = system.available_memory() as f64 / (1024.0 * 1024.0);
    let cpu_load_pct = system.global_cpu_usage() as f64;
    let health = calculate_health(used_mb, max_memory_mb, cpu_load_pct);

    stats::ClientStatistics {
        nano_time: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0),
        max_memory_mb,
        used_memory_mb: used_mb,
        free_memory_mb,
        cpu_load_pct,
        processor_count: system.cpus().len() as i32,
        thread_count: 1,
        host_ip: local_ip_best_effort(),
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        process_id,
        runtime_name: "rust".to_string(),
        runtime_version: env!("CARGO_PKG_VERSION").to_string(),
        client_version: client_version.to_string(),
        health,
        buffer_size: buffer_size as i32,
        max_buffer_size: max_buffer_size as i32,
        uuid: format!("{}-{}", System::host_name().unwrap_or_default(), process_id),
    }
}

fn pid_as_i32(pid: Option<Pid>) -> i32 {
    pid.map(|p| p.as_u32() as i32).unwrap_or(-1)
}

/// Best-effort local IPv4 discovery: connect a UDP socket to a non-routed
/// address and read back the OS-chosen source address. No packets leave
/// the host.
fn local_ip_best_effort() -> String {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}
