//! Transport adapter, consumed rather than implemented by the core:
//! the datagram socket binding itself is a deliberate external collaborator.
//! `impl Future<Output = ...> + Send` return types on a plain trait, no
//! `async_trait` boxing — driven by a `tokio::select!` loop that owns the
//! actual sockets.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{net::UdpSocket, sync::mpsc};

pub const MAX_SIP_MESSAGE_SIZE: usize = 8192;
pub const MAX_RTP_PACKET_SIZE: usize = 1500;

/// Inbound events the transport delivers over one channel: a typed union of
/// `{SipInbound, RtpInbound, TransportError}`.
#[derive(Debug)]
pub enum Event {
    SipInbound(Vec<u8>, SocketAddr),
    RtpInbound(Vec<u8>, SocketAddr),
    TransportError(anyhow::Error),
}

pub trait Transport: Send + Sync + 'static {
    /// Bind the transport and start delivering inbound events. May only be
    /// called once per transport instance.
    fn bind(&self) -> impl Future<Output = Result<mpsc::UnboundedReceiver<Event>>> + Send;

    fn send_sip(&self, bytes: &[u8], remote: SocketAddr) -> impl Future<Output = Result<()>> + Send;

    fn send_rtp(&self, bytes: &[u8], remote: SocketAddr) -> impl Future<Output = Result<()>> + Send;

    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// The production transport: one UDP socket for SIP, one for RTP.
pub struct UdpTransport {
    sip_socket: Arc<UdpSocket>,
    rtp_socket: Arc<UdpSocket>,
}

impl UdpTransport {
    pub async fn bind_ports(sip_port: u16, rtp_port: u16) -> Result<Self> {
        let sip_socket = UdpSocket::bind(("0.0.0.0", sip_port)).await?;
        let rtp_socket = UdpSocket::bind(("0.0.0.0", rtp_port)).await?;

        log::info!("sip socket bound: port={sip_port}");
        log::info!("rtp socket bound: port={rtp_port}");

        Ok(Self {
            sip_socket: Arc::new(sip_socket),
            rtp_socket: Arc::new(rtp_socket),
        })
    }
}

impl Transport for UdpTransport {
    fn bind(&self) -> impl Future<Output = Result<mpsc::UnboundedReceiver<Event>>> + Send {
        let sip_socket = self.sip_socket.clone();
        let rtp_socket = self.rtp_socket.clone();

        async move {
            let (tx, rx) = mpsc::unbounded_channel();

            tokio::spawn(async move {
                let mut sip_buf = vec![0u8; MAX_SIP_MESSAGE_SIZE];
                let mut rtp_buf = vec![0u8; MAX_RTP_PACKET_SIZE];

                loop {
                    tokio::select! {
                        result = sip_socket.recv_from(&mut sip_buf) => {
                            let event = match result {
                                Ok((len, remote)) => Event::SipInbound(sip_buf[..len].to_vec(), remote),
                                Err(err) => Event::TransportError(err.into()),
                            };

                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                        result = rtp_socket.recv_from(&mut rtp_buf) => {
                            let event = match result {
                                Ok((len, remote)) => Event::RtpInbound(rtp_buf[..len].to_vec(), remote),
                                Err(err) => Event::TransportError(err.into()),
                            };

                            if tx.send(event).is_err() {
                                break;
                            }
                        }
                    }
                }

                log::info!("transport event loop stopped");
            });

            Ok(rx)
        }
    }

    fn send_sip(&self, bytes: &[u8], remote: SocketAddr) -> impl Future<Output = Result<()>> + Send {
        let socket = self.sip_socket.clone();
        let bytes = bytes.to_vec();

        async move {
            socket.send_to(&bytes, remote).await?;
            Ok(())
        }
    }

    fn send_rtp(&self, bytes: &[u8], remote: SocketAddr) -> impl Future<Output = Result<()>> + Send {
        let socket = self.rtp_socket.clone();
        let bytes = bytes.to_vec();

        async move {
            socket.send_to(&bytes, remote).await?;
            Ok(())
        }
    }

    fn close(&self) -> impl Future<Output = Result<()>> + Send {
        async move { Ok(()) }
    }
}

/// An in-memory transport for tests: outbound sends are recorded instead of
/// hitting the network, and inbound events are injected through the paired
/// sender returned by [`MockTransport::new`]. Stands in for a real UDP
/// socket with an in-process channel.
#[derive(Clone)]
pub struct MockTransport {
    sent_sip: Arc<parking_lot::Mutex<Vec<(Vec<u8>, SocketAddr)>>>,
    sent_rtp: Arc<parking_lot::Mutex<Vec<(Vec<u8>, SocketAddr)>>>,
    inbound: Arc<parking_lot::Mutex<Option<mpsc::UnboundedReceiver<Event>>>>,
}

impl MockTransport {
    /// Returns the transport plus the sender used to feed it inbound
    /// events from a test.
    pub fn new() -> (Self, mpsc::UnboundedSender<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();

        (
            Self {
                sent_sip: Default::default(),
                sent_rtp: Default::default(),
                inbound: Arc::new(parking_lot::Mutex::new(Some(rx))),
            },
            tx,
        )
    }

    pub fn sent_sip(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.sent_sip.lock().clone()
    }

    pub fn sent_rtp(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.sent_rtp.lock().clone()
    }
}

impl Transport for MockTransport {
    fn bind(&self) -> impl Future<Output = Result<mpsc::UnboundedReceiver<Event>>> + Send {
        let inbound = self.inbound.clone();

        async move {
            inbound
                .lock()
                .take()
                .ok_or_else(|| anyhow::anyhow!("MockTransport already bound"))
        }
    }

    fn send_sip(&self, bytes: &[u8], remote: SocketAddr) -> impl Future<Output = Result<()>> + Send {
        let sent = self.sent_sip.clone();
        let bytes = bytes.to_vec();

        async move {
            sent.lock().push((bytes, remote));
            Ok(())
        }
    }

    fn send_rtp(&self, bytes: &[u8], remote: SocketAddr) -> impl Future<Output = Result<()>> + Send {
        let sent = self.sent_rtp.clone();
        let bytes = bytes.to_vec();

        async move {
            sent.lock().push((bytes, remote));
            Ok(())
        }
    }

    fn close(&self) -> impl Future<Output = Result<()>> + Send {
        async move { Ok(()) }
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport").finish()
    }
}
