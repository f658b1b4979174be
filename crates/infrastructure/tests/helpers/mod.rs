#![allow(dead_code)]
//! Mock upstream DNS servers and a capturing response writer.

use async_trait::async_trait;
use fanout_dns_infrastructure::dns::ResponseWriter;
use fanout_dns_domain::FanoutError;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;

pub type Responder = Arc<dyn Fn(&Message) -> Option<Message> + Send + Sync>;

/// Tracks how many requests a mock is serving at once.
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            current: AtomicUsize::new(0),
            max: AtomicUsize::new(0),
        })
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    fn enter(self: &Arc<Self>) -> GaugeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(Arc::clone(self))
    }
}

pub struct GaugeGuard(Arc<ConcurrencyGauge>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One mock upstream server. The handler decides the reply per query;
/// `None` swallows the query (the client runs into its read deadline).
pub struct MockUpstream {
    addr: String,
    shutdown: CancellationToken,
}

impl MockUpstream {
    pub async fn udp<H>(handler: H) -> Self
    where
        H: Fn(&Message) -> Option<Message> + Send + Sync + 'static,
    {
        Self::udp_inner(None, None, Arc::new(handler)).await
    }

    pub async fn udp_delayed<H>(delay: Duration, handler: H) -> Self
    where
        H: Fn(&Message) -> Option<Message> + Send + Sync + 'static,
    {
        Self::udp_inner(Some(delay), None, Arc::new(handler)).await
    }

    pub async fn udp_gauged<H>(delay: Duration, gauge: Arc<ConcurrencyGauge>, handler: H) -> Self
    where
        H: Fn(&Message) -> Option<Message> + Send + Sync + 'static,
    {
        Self::udp_inner(Some(delay), Some(gauge), Arc::new(handler)).await
    }

    async fn udp_inner(
        delay: Option<Duration>,
        gauge: Option<Arc<ConcurrencyGauge>>,
        handler: Responder,
    ) -> Self {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap().to_string();
        let shutdown = CancellationToken::new();

        let serve_token = shutdown.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; 65_535];
            loop {
                let (len, peer) = tokio::select! {
                    _ = serve_token.cancelled() => break,
                    received = socket.recv_from(&mut buf) => match received {
                        Ok(received) => received,
                        Err(_) => break,
                    },
                };
                let Ok(query) = Message::from_vec(&buf[..len]) else {
                    continue;
                };
                let socket = Arc::clone(&socket);
                let handler = Arc::clone(&handler);
                let gauge = gauge.clone();
                tokio::spawn(async move {
                    let _guard = gauge.as_ref().map(|g| g.enter());
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    if let Some(reply) = handler(&query) {
                        let _ = socket.send_to(&reply.to_vec().unwrap(), peer).await;
                    }
                });
            }
        });

        Self { addr, shutdown }
    }

    pub async fn tcp<H>(handler: H) -> Self
    where
        H: Fn(&Message) -> Option<Message> + Send + Sync + 'static,
    {
        let handler: Responder = Arc::new(handler);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let shutdown = CancellationToken::new();

        let serve_token = shutdown.clone();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = tokio::select! {
                    _ = serve_token.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok(accepted) => accepted,
                        Err(_) => break,
                    },
                };
                let handler = Arc::clone(&handler);
                let conn_token = serve_token.clone();
                tokio::spawn(async move {
                    loop {
                        let mut len_buf = [0u8; 2];
                        tokio::select! {
                            _ = conn_token.cancelled() => break,
                            read = stream.read_exact(&mut len_buf) => {
                                if read.is_err() {
                                    break;
                                }
                            }
                        }
                        let len = usize::from(u16::from_be_bytes(len_buf));
                        let mut wire = vec![0u8; len];
                        if stream.read_exact(&mut wire).await.is_err() {
                            break;
                        }
                        let Ok(query) = Message::from_vec(&wire) else {
                            break;
                        };
                        if let Some(reply) = handler(&query) {
                            let wire = reply.to_vec().unwrap();
                            let len = u16::try_from(wire.len()).unwrap();
                            if stream.write_all(&len.to_be_bytes()).await.is_err() {
                                break;
                            }
                            if stream.write_all(&wire).await.is_err() {
                                break;
                            }
                        }
                    }
                });
            }
        });

        Self { addr, shutdown }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Captures everything written downstream, like a recording response writer.
#[derive(Default)]
pub struct CachedWriter {
    pub answers: Vec<Message>,
}

#[async_trait]
impl ResponseWriter for CachedWriter {
    async fn write_msg(&mut self, reply: &Message) -> Result<(), FanoutError> {
        self.answers.push(reply.clone());
        Ok(())
    }
}

/// A-record query for `name` with a random transaction id.
pub fn question(name: &str) -> Message {
    let mut query = Query::new();
    query.set_name(Name::from_str(name).unwrap());
    query.set_query_type(RecordType::A);
    query.set_query_class(DNSClass::IN);
    let mut msg = Message::new();
    msg.set_id(fastrand::u16(..));
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    msg.add_query(query);
    msg
}

/// Reply skeleton mirroring the request id and question.
pub fn reply_with(req: &Message, rcode: ResponseCode) -> Message {
    let mut reply = Message::new();
    reply.set_id(req.id());
    reply.set_message_type(MessageType::Response);
    reply.set_op_code(OpCode::Query);
    reply.set_recursion_desired(req.recursion_desired());
    reply.set_recursion_available(true);
    reply.set_response_code(rcode);
    reply.add_queries(req.queries().iter().cloned());
    reply
}

/// NOERROR reply carrying a single A record for `name`.
pub fn reply_a(req: &Message, name: &str, ip: Ipv4Addr) -> Message {
    let mut reply = reply_with(req, ResponseCode::NoError);
    reply.add_answer(Record::from_rdata(
        Name::from_str(name).unwrap(),
        3600,
        RData::A(A(ip)),
    ));
    reply
}

/// NXDOMAIN reply, the shape a recursive resolver would send.
pub fn reply_nxdomain(req: &Message) -> Message {
    reply_with(req, ResponseCode::NXDomain)
}
