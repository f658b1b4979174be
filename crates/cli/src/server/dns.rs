//! UDP and TCP listeners feeding queries into the fan-out engine.

use async_trait::async_trait;
use fanout_dns_infrastructure::dns::{message, DnsHandler, Fanout, ResponseWriter};
use fanout_dns_domain::FanoutError;
use hickory_proto::op::{Message, ResponseCode};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{debug, info, warn};

pub async fn start_dns_server(bind_addr: SocketAddr, handler: Arc<Fanout>) -> anyhow::Result<()> {
    info!(bind_address = %bind_addr, "Starting DNS server");

    let udp_socket = UdpSocket::bind(bind_addr).await?;
    info!(protocol = "UDP", "DNS server listening");

    let tcp_listener = TcpListener::bind(bind_addr).await?;
    info!(protocol = "TCP", "DNS server listening");

    tokio::try_join!(
        serve_udp(udp_socket, Arc::clone(&handler)),
        serve_tcp(tcp_listener, handler),
    )?;
    Ok(())
}

async fn serve_udp(socket: UdpSocket, handler: Arc<Fanout>) -> anyhow::Result<()> {
    let socket = Arc::new(socket);
    let mut buf = vec![0u8; 65_535];
    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;
        let Ok(req) = Message::from_vec(&buf[..len]) else {
            debug!(%peer, "dropping unparseable datagram");
            continue;
        };
        let socket = Arc::clone(&socket);
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let mut writer = UdpResponseWriter { socket, peer };
            dispatch(handler.as_ref(), &mut writer, &req).await;
        });
    }
}

async fn serve_tcp(listener: TcpListener, handler: Arc<Fanout>) -> anyhow::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            let (mut read_half, write_half) = stream.into_split();
            let mut writer = TcpResponseWriter { stream: write_half };
            loop {
                let mut len_buf = [0u8; 2];
                if read_half.read_exact(&mut len_buf).await.is_err() {
                    break;
                }
                let len = usize::from(u16::from_be_bytes(len_buf));
                let mut wire = vec![0u8; len];
                if read_half.read_exact(&mut wire).await.is_err() {
                    break;
                }
                let Ok(req) = Message::from_vec(&wire) else {
                    debug!(%peer, "dropping unparseable message");
                    break;
                };
                dispatch(handler.as_ref(), &mut writer, &req).await;
            }
        });
    }
}

/// Runs one query through the handler chain, synthesising a reply when the
/// handler asks the host to (non-zero rcode) or fails outright.
async fn dispatch(handler: &Fanout, writer: &mut dyn ResponseWriter, req: &Message) {
    let synthesised = match handler.serve_dns(writer, req).await {
        Ok(ResponseCode::NoError) => return,
        Ok(rcode) => message::synth_reply(req, rcode),
        Err(err) => {
            warn!(error = %err, "query failed, answering SERVFAIL");
            message::synth_reply(req, ResponseCode::ServFail)
        }
    };
    if let Err(err) = writer.write_msg(&synthesised).await {
        warn!(error = %err, "failed to write synthesised reply");
    }
}

/// Fallback for queries outside the fan-out zone: answer REFUSED rather
/// than forwarding them anywhere.
pub struct RefusedHandler;

#[async_trait]
impl DnsHandler for RefusedHandler {
    async fn serve_dns(
        &self,
        writer: &mut dyn ResponseWriter,
        req: &Message,
    ) -> Result<ResponseCode, FanoutError> {
        writer
            .write_msg(&message::synth_reply(req, ResponseCode::Refused))
            .await?;
        Ok(ResponseCode::NoError)
    }
}

struct UdpResponseWriter {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

#[async_trait]
impl ResponseWriter for UdpResponseWriter {
    async fn write_msg(&mut self, reply: &Message) -> Result<(), FanoutError> {
        let wire = reply
            .to_vec()
            .map_err(|err| FanoutError::Proto(err.to_string()))?;
        self.socket
            .send_to(&wire, self.peer)
            .await
            .map_err(|err| FanoutError::Write(err.to_string()))?;
        Ok(())
    }
}

struct TcpResponseWriter {
    stream: OwnedWriteHalf,
}

#[async_trait]
impl ResponseWriter for TcpResponseWriter {
    async fn write_msg(&mut self, reply: &Message) -> Result<(), FanoutError> {
        let wire = reply
            .to_vec()
            .map_err(|err| FanoutError::Proto(err.to_string()))?;
        let len = u16::try_from(wire.len())
            .map_err(|_| FanoutError::Proto(format!("reply too large for stream: {}", wire.len())))?;
        self.stream
            .write_all(&len.to_be_bytes())
            .await
            .map_err(|err| FanoutError::Write(err.to_string()))?;
        self.stream
            .write_all(&wire)
            .await
            .map_err(|err| FanoutError::Write(err.to_string()))?;
        Ok(())
    }
}
