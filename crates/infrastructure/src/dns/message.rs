//! Helpers over `hickory-proto` messages.

use compact_str::{format_compact, CompactString};
use hickory_proto::op::{Message, MessageType, ResponseCode};

/// Smallest UDP receive buffer DNS allows.
pub const MIN_UDP_SIZE: u16 = 512;

/// Lowercased FQDN of the first question, or "." when the message carries
/// no question.
pub fn query_name(msg: &Message) -> String {
    msg.queries()
        .first()
        .map(|q| q.name().to_string().to_ascii_lowercase())
        .unwrap_or_else(|| ".".to_string())
}

/// UDP receive buffer to use for `req`: the EDNS0-advertised payload size,
/// floored at 512 octets.
pub fn requested_udp_size(req: &Message) -> u16 {
    let advertised = req
        .extensions()
        .as_ref()
        .map(|edns| edns.max_payload())
        .unwrap_or(0);
    advertised.max(MIN_UDP_SIZE)
}

/// Safety net beyond per-exchange id matching: the reply must be a response
/// carrying the request's id and question.
pub fn matches_reply(req: &Message, reply: &Message) -> bool {
    if reply.id() != req.id() || reply.message_type() != MessageType::Response {
        return false;
    }
    match (req.queries().first(), reply.queries().first()) {
        (Some(q), Some(r)) => {
            q.name() == r.name()
                && q.query_type() == r.query_type()
                && q.query_class() == r.query_class()
        }
        (None, None) => true,
        _ => false,
    }
}

/// Synthesises a reply to `req` with the given rcode and no records.
pub fn synth_reply(req: &Message, rcode: ResponseCode) -> Message {
    let mut reply = Message::new();
    reply.set_id(req.id());
    reply.set_message_type(MessageType::Response);
    reply.set_op_code(req.op_code());
    reply.set_recursion_desired(req.recursion_desired());
    reply.set_response_code(rcode);
    reply.add_queries(req.queries().iter().cloned());
    reply
}

/// Textual rcode for metrics labels.
pub fn rcode_text(rcode: ResponseCode) -> CompactString {
    match rcode {
        ResponseCode::NoError => CompactString::const_new("NOERROR"),
        ResponseCode::FormErr => CompactString::const_new("FORMERR"),
        ResponseCode::ServFail => CompactString::const_new("SERVFAIL"),
        ResponseCode::NXDomain => CompactString::const_new("NXDOMAIN"),
        ResponseCode::NotImp => CompactString::const_new("NOTIMP"),
        ResponseCode::Refused => CompactString::const_new("REFUSED"),
        other => format_compact!("{:?}", other),
    }
}
