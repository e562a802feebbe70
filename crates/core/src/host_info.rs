/// Best-effort host identity for volume labels and provenance (spec.md §3
/// Chunk property iv, §4.8). None of these are allowed to fail the run;
/// every lookup falls back to a placeholder rather than propagating an
/// error.
pub fn hostname() -> String {
    if let Ok(v) = std::env::var("HOSTNAME") {
        if !v.is_empty() {
            return v;
        }
    }
    gethostname_libc().unwrap_or_else(|| "unknown-host".to_string())
}

fn gethostname_libc() -> Option<String> {
    let mut buf = vec![0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..len].to_vec()).ok()
}

pub fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| "unknown-user".to_string())
}

/// Local IPv4 address for volume labels and provenance (spec.md §3 Chunk
/// property iv, §4.8). When the platform probe found an `ip`/`ifconfig`
/// binary (spec.md §4.1), its output is preferred since it reflects the
/// address the operator would see; otherwise falls back to a routing-table
/// trick that sends no packets: connecting a UDP socket only binds a route
/// locally, it never transmits until `send()` is called.
pub fn local_ip(has_ip_discovery_tool: bool) -> String {
    if let Ok(v) = std::env::var("SEQRUN_HOST_IP") {
        if !v.is_empty() {
            return v;
        }
    }
    if has_ip_discovery_tool {
        if let Some(ip) = discover_local_ip_via_tool() {
            return ip;
        }
    }
    discover_local_ip_via_socket().unwrap_or_else(|| "0.0.0.0".to_string())
}

fn discover_local_ip_via_tool() -> Option<String> {
    let output = std::process::Command::new("ip")
        .args(["route", "get", "8.8.8.8"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let mut tokens = text.split_whitespace();
    while let Some(token) = tokens.next() {
        if token == "src" {
            return tokens.next().map(str::to_string);
        }
    }
    None
}

fn discover_local_ip_via_socket() -> Option<String> {
    use std::net::UdpSocket;
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip().to_string())
}
