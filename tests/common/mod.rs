use std::time::Duration;

use peerwire::{Datagram, MuxConfig, UdpMux};
use tokio::sync::mpsc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn loopback_mux() -> (UdpMux, mpsc::Receiver<Datagram>) {
    UdpMux::bind(MuxConfig::new("127.0.0.1:0".parse().unwrap()))
        .await
        .expect("bind loopback")
}

pub async fn recv(rx: &mut mpsc::Receiver<Datagram>) -> Datagram {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for datagram")
        .expect("reader stopped")
}
