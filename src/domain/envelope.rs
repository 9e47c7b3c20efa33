//! Configuration Envelope
//!
//! Every object exchanged with the API is wrapped in an envelope:
//!
//! ```json
//! {
//!   "type": "frontend",
//!   "metadata": { "name": "testservice" },
//!   "config": { "addresses": ["10.40.50.23", "2001:700:fffd::23"] }
//! }
//! ```
//!
//! The shape of `config` depends on `type`, so decoding happens in two
//! phases: the envelope is parsed with `config` kept as raw JSON, then the
//! tag selects a decoder from [`DECODERS`] for the payload. Unknown tags
//! fail closed with [`EnvelopeError::UnsupportedType`].

use crate::domain::entities::{FrontendConfig, Ingress, Metadata, SharedHttpConfig, TcpConfig};
use crate::domain::value_objects::ServiceType;
use bytes::{Buf, BytesMut};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Errors raised while decoding or encoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("unsupported configuration type '{0}'")]
    UnsupportedType(String),
    #[error("invalid '{kind}' configuration: {source}")]
    InvalidConfig {
        kind: ServiceType,
        #[source]
        source: serde_json::Error,
    },
    #[error("error decoding Service object at index {index}: {source}")]
    Element {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("expected {expected} at byte {offset}")]
    Syntax {
        offset: usize,
        expected: &'static str,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Raw envelope: the tag and metadata are decoded, the payload is not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Box<RawValue>>,
}

impl Message {
    /// Wrap a typed configuration into an envelope.
    ///
    /// A zero-value configuration is left out of the envelope entirely.
    pub fn encode(metadata: Metadata, config: &Config) -> Result<Self, EnvelopeError> {
        let raw = if config.is_empty() {
            None
        } else {
            Some(serde_json::value::to_raw_value(config)?)
        };
        Ok(Self {
            kind: config.kind().as_str().to_string(),
            metadata,
            config: raw,
        })
    }

    /// Resolve the tag without touching the payload.
    pub fn service_type(&self) -> Result<ServiceType, EnvelopeError> {
        ServiceType::parse(&self.kind)
            .ok_or_else(|| EnvelopeError::UnsupportedType(self.kind.clone()))
    }

    /// Second decoding phase: interpret `config` according to `type`.
    pub fn decode_config(&self) -> Result<Config, EnvelopeError> {
        Config::decode(&self.kind, self.config.as_deref())
    }
}

/// Typed configuration payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Config {
    Frontend(FrontendConfig),
    Tcp(TcpConfig),
    /// Extension point; see [`SharedHttpConfig`].
    SharedHttp(SharedHttpConfig),
}

type Decoder = fn(&str) -> Result<Config, serde_json::Error>;

fn decode_frontend(raw: &str) -> Result<Config, serde_json::Error> {
    serde_json::from_str(raw).map(Config::Frontend)
}

fn decode_tcp(raw: &str) -> Result<Config, serde_json::Error> {
    serde_json::from_str(raw).map(Config::Tcp)
}

fn decode_shared_http(raw: &str) -> Result<Config, serde_json::Error> {
    serde_json::from_str(raw).map(Config::SharedHttp)
}

/// Payload decoders keyed by envelope tag.
pub const DECODERS: &[(ServiceType, Decoder)] = &[
    (ServiceType::Frontend, decode_frontend),
    (ServiceType::Tcp, decode_tcp),
    (ServiceType::SharedHttp, decode_shared_http),
];

impl Config {
    /// Decode a raw payload for the given tag.
    ///
    /// An absent (or `null`) payload decodes to the zero value of the
    /// selected type.
    pub fn decode(kind: &str, raw: Option<&RawValue>) -> Result<Self, EnvelopeError> {
        let (tag, decoder) = DECODERS
            .iter()
            .find(|(tag, _)| tag.as_str() == kind)
            .ok_or_else(|| EnvelopeError::UnsupportedType(kind.to_string()))?;

        let text = raw.map(RawValue::get).unwrap_or("{}");
        decoder(text).map_err(|source| EnvelopeError::InvalidConfig { kind: *tag, source })
    }

    pub fn kind(&self) -> ServiceType {
        match self {
            Self::Frontend(_) => ServiceType::Frontend,
            Self::Tcp(_) => ServiceType::Tcp,
            Self::SharedHttp(_) => ServiceType::SharedHttp,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Frontend(c) => c.is_empty(),
            Self::Tcp(c) => c.is_empty(),
            Self::SharedHttp(c) => c.is_empty(),
        }
    }

    pub fn as_frontend(&self) -> Option<&FrontendConfig> {
        match self {
            Self::Frontend(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_tcp(&self) -> Option<&TcpConfig> {
        match self {
            Self::Tcp(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_shared_http(&self) -> Option<&SharedHttpConfig> {
        match self {
            Self::SharedHttp(c) => Some(c),
            _ => None,
        }
    }
}

impl Serialize for Config {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Frontend(c) => c.serialize(serializer),
            Self::Tcp(c) => c.serialize(serializer),
            Self::SharedHttp(c) => c.serialize(serializer),
        }
    }
}

impl From<FrontendConfig> for Config {
    fn from(c: FrontendConfig) -> Self {
        Self::Frontend(c)
    }
}

impl From<TcpConfig> for Config {
    fn from(c: TcpConfig) -> Self {
        Self::Tcp(c)
    }
}

impl From<SharedHttpConfig> for Config {
    fn from(c: SharedHttpConfig) -> Self {
        Self::SharedHttp(c)
    }
}

/// A service as handled by the load balancers.
///
/// The `type` tag is derived from the config variant, so the two cannot
/// disagree. `ingress` is filled in by the gateway after a get or sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub metadata: Metadata,
    pub config: Config,
    pub ingress: Vec<Ingress>,
}

impl Service {
    pub fn new(name: impl Into<String>, config: impl Into<Config>) -> Self {
        Self {
            metadata: Metadata::named(name),
            config: config.into(),
            ingress: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn kind(&self) -> ServiceType {
        self.config.kind()
    }

    /// Build a service from a raw envelope.
    pub fn from_message(message: Message) -> Result<Self, EnvelopeError> {
        let config = message.decode_config()?;
        Ok(Self {
            metadata: message.metadata,
            config,
            ingress: Vec::new(),
        })
    }

    /// Envelope form of this service, without ingress.
    pub fn to_message(&self) -> Result<Message, EnvelopeError> {
        Message::encode(self.metadata.clone(), &self.config)
    }
}

impl Serialize for Service {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Service", 4)?;
        state.serialize_field("type", self.kind().as_str())?;
        if self.metadata.is_empty() {
            state.skip_field("metadata")?;
        } else {
            state.serialize_field("metadata", &self.metadata)?;
        }
        if self.config.is_empty() {
            state.skip_field("config")?;
        } else {
            state.serialize_field("config", &self.config)?;
        }
        if self.ingress.is_empty() {
            state.skip_field("ingress")?;
        } else {
            state.serialize_field("ingress", &self.ingress)?;
        }
        state.end()
    }
}

#[derive(Deserialize)]
struct ServiceWire {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    config: Option<Box<RawValue>>,
    #[serde(default)]
    ingress: Vec<Ingress>,
}

impl<'de> Deserialize<'de> for Service {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = ServiceWire::deserialize(deserializer)?;
        let config = Config::decode(&wire.kind, wire.config.as_deref())
            .map_err(<D::Error as de::Error>::custom)?;
        Ok(Self {
            metadata: wire.metadata,
            config,
            ingress: wire.ingress,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Start,
    First,
    Next,
    Element,
    Trailer,
    Done,
}

/// Progress reported by [`ServiceStream::step`].
#[derive(Debug)]
pub enum StreamStep {
    /// One array element was decoded, or decoding failed.
    Item(Result<Service, EnvelopeError>),
    /// The buffered input ends mid-token; push more with [`ServiceStream::push`].
    NeedMore,
    /// The array is closed and the input is exhausted.
    End,
}

/// Incrementally decodes a JSON array of services, one element at a time.
///
/// Input arrives in chunks through [`push`](Self::push) and is closed with
/// [`end_input`](Self::end_input). Each element is yielded as soon as its
/// bytes are buffered; consumed bytes are released on the next push.
/// The first malformed element yields an error and ends the stream. An
/// empty body is treated as an empty array.
#[derive(Debug)]
pub struct ServiceStream {
    buf: BytesMut,
    pos: usize,
    /// Bytes already released from the front of `buf`
    released: usize,
    index: usize,
    state: StreamState,
    input_done: bool,
}

impl Default for ServiceStream {
    fn default() -> Self {
        Self {
            buf: BytesMut::new(),
            pos: 0,
            released: 0,
            index: 0,
            state: StreamState::Start,
            input_done: false,
        }
    }
}

impl ServiceStream {
    /// Decoder over a body that is already complete.
    pub fn new(body: impl AsRef<[u8]>) -> Self {
        let mut stream = Self::default();
        stream.push(body.as_ref());
        stream.end_input();
        stream
    }

    /// Decoder waiting for its first chunk.
    pub fn incremental() -> Self {
        Self::default()
    }

    /// Append a chunk of the body.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.advance(self.pos);
        self.released += self.pos;
        self.pos = 0;
        self.buf.extend_from_slice(chunk);
    }

    /// Mark the body as complete.
    pub fn end_input(&mut self) {
        self.input_done = true;
    }

    /// Stop decoding; later steps report [`StreamStep::End`].
    pub fn abort(&mut self) {
        self.state = StreamState::Done;
        self.buf.clear();
        self.pos = 0;
    }

    /// Number of elements decoded so far.
    pub fn decoded(&self) -> usize {
        self.index
    }

    /// Decode as far as the buffered input allows.
    pub fn step(&mut self) -> StreamStep {
        self.skip_whitespace();
        match self.state {
            StreamState::Done => StreamStep::End,
            StreamState::Start => match self.peek() {
                Some(b'[') => {
                    self.pos += 1;
                    self.state = StreamState::First;
                    self.step()
                }
                Some(_) => self.fail("'['"),
                None if self.input_done => {
                    self.state = StreamState::Done;
                    StreamStep::End
                }
                None => StreamStep::NeedMore,
            },
            StreamState::First => match self.peek() {
                Some(b']') => self.close_array(),
                Some(_) => self.decode_element(),
                None => self.starve("array element or ']'"),
            },
            StreamState::Next => match self.peek() {
                Some(b']') => self.close_array(),
                Some(b',') => {
                    self.pos += 1;
                    self.state = StreamState::Element;
                    self.step()
                }
                Some(_) => self.fail("',' or ']'"),
                None => self.starve("',' or ']'"),
            },
            StreamState::Element => match self.peek() {
                Some(_) => self.decode_element(),
                None => self.starve("array element"),
            },
            StreamState::Trailer => match self.peek() {
                Some(_) => self.fail("end of input"),
                None if self.input_done => {
                    self.state = StreamState::Done;
                    StreamStep::End
                }
                None => StreamStep::NeedMore,
            },
        }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek() {
            if !b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
    }

    fn fail(&mut self, expected: &'static str) -> StreamStep {
        self.state = StreamState::Done;
        StreamStep::Item(Err(EnvelopeError::Syntax {
            offset: self.released + self.pos,
            expected,
        }))
    }

    /// Out of buffered bytes: an error once the input is complete.
    fn starve(&mut self, expected: &'static str) -> StreamStep {
        if self.input_done {
            self.fail(expected)
        } else {
            StreamStep::NeedMore
        }
    }

    fn close_array(&mut self) -> StreamStep {
        self.pos += 1;
        self.state = StreamState::Trailer;
        self.step()
    }

    fn decode_element(&mut self) -> StreamStep {
        let (result, consumed) = {
            let mut values =
                serde_json::Deserializer::from_slice(&self.buf[self.pos..]).into_iter::<Service>();
            let result = values.next();
            (result, values.byte_offset())
        };
        match result {
            Some(Ok(service)) => {
                self.pos += consumed;
                self.index += 1;
                self.state = StreamState::Next;
                StreamStep::Item(Ok(service))
            }
            Some(Err(source)) if source.is_eof() && !self.input_done => StreamStep::NeedMore,
            Some(Err(source)) => {
                self.state = StreamState::Done;
                StreamStep::Item(Err(EnvelopeError::Element {
                    index: self.index,
                    source,
                }))
            }
            None => self.starve("array element"),
        }
    }
}

impl Iterator for ServiceStream {
    type Item = Result<Service, EnvelopeError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            StreamStep::Item(item) => Some(item),
            StreamStep::NeedMore | StreamStep::End => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Backend, HealthCheck};
    use bytes::Bytes;
    use serde_json::json;

    fn sample_tcp() -> TcpConfig {
        let mut cfg = TcpConfig {
            method: "least_conn".to_string(),
            ports: vec![80, 443],
            upstream_max_conns: 100,
            acl: vec![
                "10.10.20.0/24".parse().unwrap(),
                "2001:700:1337::/48".parse().unwrap(),
            ],
            health_check: HealthCheck {
                port: 1337,
                send: "healthz\n".to_string(),
                expect: "^OK$".to_string(),
            },
            frontend: "foobar".to_string(),
            ..Default::default()
        };
        cfg.backends.insert(
            "hostname1.example.com".to_string(),
            Backend {
                addrs: vec!["10.3.2.43".parse().unwrap(), "2001:700:f00d::8".parse().unwrap()],
            },
        );
        cfg
    }

    // ===== Message Tests =====

    #[test]
    fn test_message_keeps_config_raw() {
        let msg: Message = serde_json::from_str(concat!(
            r#"{"type":"frontend","metadata":{"name":"fe"},"#,
            r#""config":{"addresses":["10.40.50.23"]}}"#,
        ))
        .unwrap();
        assert_eq!(msg.kind, "frontend");
        assert_eq!(msg.metadata.name, "fe");
        assert_eq!(msg.config.as_ref().unwrap().get(), r#"{"addresses":["10.40.50.23"]}"#);
    }

    #[test]
    fn test_message_decode_config_by_tag() {
        let msg: Message = serde_json::from_str(concat!(
            r#"{"type":"tcp","metadata":{"name":"svc"},"#,
            r#""config":{"method":"least_conn","ports":[80]}}"#,
        ))
        .unwrap();
        assert_eq!(msg.service_type().unwrap(), ServiceType::Tcp);

        let cfg = msg.decode_config().unwrap();
        let tcp = cfg.as_tcp().unwrap();
        assert_eq!(tcp.method, "least_conn");
        assert_eq!(tcp.ports, vec![80]);
        assert!(cfg.as_frontend().is_none());
    }

    #[test]
    fn test_message_unknown_type_fails_closed() {
        for kind in ["udp", "", "TCP", "shared-http"] {
            let msg = Message {
                kind: kind.to_string(),
                metadata: Metadata::named("x"),
                config: Some(RawValue::from_string("{}".to_string()).unwrap()),
            };
            let err = msg.decode_config().unwrap_err();
            assert!(
                matches!(&err, EnvelopeError::UnsupportedType(k) if k == kind),
                "kind {:?} gave {:?}",
                kind,
                err
            );
            assert!(msg.service_type().is_err());
        }
    }

    #[test]
    fn test_message_absent_config_is_zero_value() {
        let msg: Message = serde_json::from_str(r#"{"type":"tcp"}"#).unwrap();
        assert!(msg.config.is_none());
        assert_eq!(msg.decode_config().unwrap(), Config::Tcp(TcpConfig::default()));

        let msg: Message = serde_json::from_str(r#"{"type":"frontend","config":null}"#).unwrap();
        assert_eq!(
            msg.decode_config().unwrap(),
            Config::Frontend(FrontendConfig::default())
        );
    }

    #[test]
    fn test_message_invalid_payload() {
        let msg: Message =
            serde_json::from_str(r#"{"type":"tcp","config":{"ports":["eighty"]}}"#).unwrap();
        let err = msg.decode_config().unwrap_err();
        assert!(matches!(
            err,
            EnvelopeError::InvalidConfig {
                kind: ServiceType::Tcp,
                ..
            }
        ));
    }

    #[test]
    fn test_message_encode_omits_zero_parts() {
        let msg = Message::encode(Metadata::default(), &Config::Tcp(TcpConfig::default())).unwrap();
        assert_eq!(serde_json::to_string(&msg).unwrap(), r#"{"type":"tcp"}"#);
    }

    #[test]
    fn test_message_encode_roundtrip() {
        let config = Config::Tcp(sample_tcp());
        let msg = Message::encode(Metadata::named("svc"), &config).unwrap();
        let text = serde_json::to_string(&msg).unwrap();

        let back: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(back.metadata, Metadata::named("svc"));
        assert_eq!(back.decode_config().unwrap(), config);
    }

    #[test]
    fn test_decoder_table_covers_all_tags() {
        for tag in ServiceType::ALL {
            let cfg = Config::decode(tag.as_str(), None).unwrap();
            assert_eq!(cfg.kind(), tag);
            assert!(cfg.is_empty());
        }
    }

    // ===== Service Tests =====

    #[test]
    fn test_service_serializes_type_from_config() {
        let svc = Service::new(
            "web",
            FrontendConfig {
                addresses: vec!["10.40.50.23".parse().unwrap()],
            },
        );
        let value = serde_json::to_value(&svc).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "frontend",
                "metadata": { "name": "web" },
                "config": { "addresses": ["10.40.50.23"] }
            })
        );
    }

    #[test]
    fn test_service_roundtrip() {
        let mut svc = Service::new("svc", sample_tcp());
        svc.ingress.push(Ingress {
            ip: Some("192.0.2.1".parse().unwrap()),
            hostname: String::new(),
        });

        let text = serde_json::to_string(&svc).unwrap();
        let back: Service = serde_json::from_str(&text).unwrap();
        assert_eq!(back, svc);
    }

    #[test]
    fn test_service_zero_config_omitted() {
        let svc = Service::new("empty", TcpConfig::default());
        let text = serde_json::to_string(&svc).unwrap();
        assert_eq!(text, r#"{"type":"tcp","metadata":{"name":"empty"}}"#);

        let back: Service = serde_json::from_str(&text).unwrap();
        assert_eq!(back, svc);
    }

    #[test]
    fn test_service_unknown_type_is_error() {
        let result: Result<Service, _> =
            serde_json::from_str(r#"{"type":"udp","metadata":{"name":"x"},"config":{}}"#);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("unsupported configuration type 'udp'"));
    }

    #[test]
    fn test_service_from_message() {
        let msg: Message = serde_json::from_str(concat!(
            r#"{"type":"frontend","metadata":{"name":"fe"},"#,
            r#""config":{"addresses":["2001:700:fffd::23"]}}"#,
        ))
        .unwrap();
        let svc = Service::from_message(msg).unwrap();
        assert_eq!(svc.name(), "fe");
        assert_eq!(svc.kind(), ServiceType::Frontend);

        let back = svc.to_message().unwrap();
        assert_eq!(back.kind, "frontend");
    }

    // ===== ServiceStream Tests =====

    #[test]
    fn test_stream_decodes_each_element() {
        let body = r#" [
            {"type":"frontend","metadata":{"name":"a"},"config":{"addresses":["10.0.0.1"]}},
            {"type":"tcp","metadata":{"name":"b"},"config":{"ports":[22]}}
        ] "#;
        let services: Vec<Service> = ServiceStream::new(body.as_bytes().to_vec())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].name(), "a");
        assert_eq!(services[1].kind(), ServiceType::Tcp);
    }

    #[test]
    fn test_stream_empty_inputs() {
        assert_eq!(ServiceStream::new(Bytes::from_static(b"[]")).count(), 0);
        assert_eq!(ServiceStream::new(Bytes::from_static(b"  [ ]\n")).count(), 0);
        assert_eq!(ServiceStream::new(Bytes::new()).count(), 0);
    }

    #[test]
    fn test_stream_is_lazy() {
        let body = r#"[{"type":"tcp","metadata":{"name":"ok"}},{"type":"bogus"}]"#;
        let mut stream = ServiceStream::new(body.as_bytes().to_vec());

        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.name(), "ok");

        let second = stream.next().unwrap();
        assert!(matches!(second, Err(EnvelopeError::Element { index: 1, .. })));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_stream_rejects_non_array() {
        let mut stream = ServiceStream::new(Bytes::from_static(br#"{"type":"tcp"}"#));
        assert!(matches!(
            stream.next(),
            Some(Err(EnvelopeError::Syntax { offset: 0, .. }))
        ));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_stream_rejects_missing_separator() {
        let body = r#"[{"type":"tcp"} {"type":"tcp"}]"#;
        let results: Vec<_> = ServiceStream::new(body.as_bytes().to_vec()).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(EnvelopeError::Syntax { .. })));
    }

    #[test]
    fn test_stream_rejects_truncated_array() {
        let body = r#"[{"type":"tcp"},"#;
        let results: Vec<_> = ServiceStream::new(body.as_bytes().to_vec()).collect();
        assert_eq!(results.len(), 2);
        assert!(results[1].is_err());
    }

    #[test]
    fn test_stream_rejects_trailing_garbage() {
        let results: Vec<_> = ServiceStream::new(Bytes::from_static(b"[] x")).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(EnvelopeError::Syntax { .. })));
    }

    #[test]
    fn test_stream_yields_element_before_input_ends() {
        let mut stream = ServiceStream::incremental();
        assert!(matches!(stream.step(), StreamStep::NeedMore));

        stream.push(br#"[{"type":"tcp","metadata":{"na"#);
        assert!(matches!(stream.step(), StreamStep::NeedMore));

        stream.push(br#"me":"first"}},"#);
        match stream.step() {
            StreamStep::Item(Ok(service)) => assert_eq!(service.name(), "first"),
            other => panic!("expected first service, got {:?}", other),
        }
        assert!(matches!(stream.step(), StreamStep::NeedMore));

        stream.push(br#"{"type":"frontend","metadata":{"name":"second"}}]"#);
        match stream.step() {
            StreamStep::Item(Ok(service)) => assert_eq!(service.name(), "second"),
            other => panic!("expected second service, got {:?}", other),
        }
        // Trailing bytes may still arrive until the input is closed
        assert!(matches!(stream.step(), StreamStep::NeedMore));
        stream.push(b"\n");
        stream.end_input();
        assert!(matches!(stream.step(), StreamStep::End));
        assert_eq!(stream.decoded(), 2);
    }

    #[test]
    fn test_stream_byte_at_a_time() {
        let body = r#"[{"type":"tcp","metadata":{"name":"a"},"config":{"ports":[80]}},
            {"type":"frontend","metadata":{"name":"b"}}]"#;
        let mut stream = ServiceStream::incremental();
        let mut names = Vec::new();
        for byte in body.as_bytes() {
            stream.push(std::slice::from_ref(byte));
            while let StreamStep::Item(item) = stream.step() {
                names.push(item.unwrap().metadata.name);
            }
        }
        stream.end_input();
        assert!(matches!(stream.step(), StreamStep::End));
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_stream_error_offset_counts_released_bytes() {
        let mut stream = ServiceStream::incremental();
        stream.push(br#"[{"type":"tcp"}"#);
        assert!(matches!(stream.step(), StreamStep::Item(Ok(_))));
        stream.push(b" x");
        match stream.step() {
            StreamStep::Item(Err(EnvelopeError::Syntax { offset, .. })) => assert_eq!(offset, 16),
            other => panic!("expected syntax error, got {:?}", other),
        }
        assert!(matches!(stream.step(), StreamStep::End));
    }

    #[test]
    fn test_stream_truncated_element_fails_at_end_of_input() {
        let mut stream = ServiceStream::incremental();
        stream.push(br#"[{"type":"tcp","#);
        assert!(matches!(stream.step(), StreamStep::NeedMore));
        stream.end_input();
        assert!(matches!(
            stream.step(),
            StreamStep::Item(Err(EnvelopeError::Element { index: 0, .. }))
        ));
    }

    #[test]
    fn test_stream_abort() {
        let mut stream = ServiceStream::incremental();
        stream.push(b"[");
        stream.abort();
        assert!(matches!(stream.step(), StreamStep::End));
    }
}
