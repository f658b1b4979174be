use crate::dns::message::MIN_UDP_SIZE;
use fanout_dns_domain::FanoutError;
use hickory_proto::op::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio_rustls::client::TlsStream;

/// One connected DNS wire link. Dropped (and thereby closed) on every exit
/// path of an exchange, including cancellation.
pub enum DnsConn {
    Udp { socket: UdpSocket, recv_size: usize },
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl DnsConn {
    pub(crate) fn udp(socket: UdpSocket) -> Self {
        Self::Udp {
            socket,
            recv_size: usize::from(MIN_UDP_SIZE),
        }
    }

    /// Sizes the UDP receive buffer; no-op for stream transports, which
    /// frame messages explicitly.
    pub fn set_udp_size(&mut self, size: u16) {
        if let Self::Udp { recv_size, .. } = self {
            *recv_size = usize::from(size.max(MIN_UDP_SIZE));
        }
    }

    pub async fn send_msg(&mut self, msg: &Message) -> Result<(), FanoutError> {
        let wire = msg
            .to_vec()
            .map_err(|err| FanoutError::Proto(err.to_string()))?;
        match self {
            Self::Udp { socket, .. } => {
                socket
                    .send(&wire)
                    .await
                    .map_err(|err| FanoutError::Io(err.to_string()))?;
            }
            Self::Tcp(stream) => send_framed(stream, &wire).await?,
            Self::Tls(stream) => send_framed(stream.as_mut(), &wire).await?,
        }
        Ok(())
    }

    pub async fn recv_msg(&mut self) -> Result<Message, FanoutError> {
        let wire = match self {
            Self::Udp { socket, recv_size } => {
                let mut buf = vec![0u8; *recv_size];
                let len = socket
                    .recv(&mut buf)
                    .await
                    .map_err(|err| FanoutError::Io(err.to_string()))?;
                buf.truncate(len);
                buf
            }
            Self::Tcp(stream) => recv_framed(stream).await?,
            Self::Tls(stream) => recv_framed(stream.as_mut()).await?,
        };
        Message::from_vec(&wire).map_err(|err| FanoutError::Proto(err.to_string()))
    }
}

/// RFC 1035 stream framing: two-octet big-endian length prefix.
async fn send_framed<S: AsyncWrite + Unpin>(stream: &mut S, wire: &[u8]) -> Result<(), FanoutError> {
    let len = u16::try_from(wire.len())
        .map_err(|_| FanoutError::Proto(format!("message too large for stream: {}", wire.len())))?;
    stream
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|err| FanoutError::Io(err.to_string()))?;
    stream
        .write_all(wire)
        .await
        .map_err(|err| FanoutError::Io(err.to_string()))?;
    stream
        .flush()
        .await
        .map_err(|err| FanoutError::Io(err.to_string()))?;
    Ok(())
}

async fn recv_framed<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Vec<u8>, FanoutError> {
    let mut len_buf = [0u8; 2];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|err| FanoutError::Io(err.to_string()))?;
    let len = usize::from(u16::from_be_bytes(len_buf));
    let mut wire = vec![0u8; len];
    stream
        .read_exact(&mut wire)
        .await
        .map_err(|err| FanoutError::Io(err.to_string()))?;
    Ok(wire)
}
