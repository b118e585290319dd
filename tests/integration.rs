//! Integration tests for rabbitwire.
//!
//! These exercise the full engine - writer task, dispatcher, correlator,
//! reassembler, class façades - against a scripted broker on the other
//! end of an in-memory duplex stream.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};

use rabbitwire::codec::WireWrite;
use rabbitwire::methods::{class, Method};
use rabbitwire::protocol::{build_frame, Frame, FrameBuffer, FrameKind, FRAME_END};
use rabbitwire::writer::{spawn_writer_task, WriterConfig};
use rabbitwire::{AmqpError, BasicProperties, Channel, Dispatcher, FieldTable, FieldValue};

/// The broker side of a test connection: reads the client's frames and
/// writes scripted responses.
struct Broker {
    read: ReadHalf<DuplexStream>,
    write: WriteHalf<DuplexStream>,
    frames: FrameBuffer,
    buf: Vec<u8>,
}

impl Broker {
    fn new(stream: DuplexStream) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self {
            read,
            write,
            frames: FrameBuffer::new(),
            buf: vec![0u8; 64 * 1024],
        }
    }

    async fn next_frame(&mut self) -> Frame {
        loop {
            let n = self.read.read(&mut self.buf).await.unwrap();
            assert!(n > 0, "client hung up while broker awaited a frame");
            let mut frames = self.frames.push(&self.buf[..n]).unwrap();
            if let Some(frame) = frames.pop() {
                assert!(frames.is_empty(), "scripted broker expects one frame at a time");
                return frame;
            }
        }
    }

    /// Collect frames until `count` have arrived (they may share reads).
    async fn next_frames(&mut self, count: usize) -> Vec<Frame> {
        let mut collected = Vec::new();
        while collected.len() < count {
            let n = self.read.read(&mut self.buf).await.unwrap();
            assert!(n > 0, "client hung up while broker awaited frames");
            collected.extend(self.frames.push(&self.buf[..n]).unwrap());
        }
        collected
    }

    async fn send_method(&mut self, channel: u16, method: Method, arguments: &[u8]) {
        let (class_id, method_id) = method.ids();
        let mut payload = BytesMut::new();
        payload.put_u16(class_id);
        payload.put_u16(method_id);
        payload.put_slice(arguments);
        self.write
            .write_all(&build_frame(FrameKind::Method, channel, &payload))
            .await
            .unwrap();
    }

    async fn send_content(
        &mut self,
        channel: u16,
        properties: &BasicProperties,
        body_chunks: &[&[u8]],
    ) {
        let body_size: usize = body_chunks.iter().map(|c| c.len()).sum();
        let mut header = BytesMut::new();
        header.put_u16(class::BASIC);
        header.put_u16(0);
        header.put_u64(body_size as u64);
        properties.encode(&mut header).unwrap();
        self.write
            .write_all(&build_frame(FrameKind::Header, channel, &header))
            .await
            .unwrap();

        for chunk in body_chunks {
            self.write
                .write_all(&build_frame(FrameKind::Body, channel, chunk))
                .await
                .unwrap();
        }
    }
}

/// A wired-up engine: channel 1 attached, dispatcher running.
fn connect() -> (Channel, Broker) {
    let (client_end, broker_end) = duplex(256 * 1024);
    let (read, write) = tokio::io::split(client_end);

    let (writer, _writer_task) = spawn_writer_task(write, WriterConfig::default());
    let dispatcher = Dispatcher::new();
    let channel = Channel::new(1, writer);
    dispatcher.attach(&channel);

    tokio::spawn(async move { dispatcher.run(read).await });

    (channel, Broker::new(broker_end))
}

fn method_of(frame: &Frame) -> (Method, Bytes) {
    assert!(frame.is_method());
    let class_id = u16::from_be_bytes([frame.payload[0], frame.payload[1]]);
    let method_id = u16::from_be_bytes([frame.payload[2], frame.payload[3]]);
    (
        Method::from_ids(class_id, method_id).unwrap(),
        frame.payload.slice(4..),
    )
}

#[tokio::test]
async fn exchange_declare_resolves_on_declare_ok() {
    let (channel, mut broker) = connect();

    let declare = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .exchange()
                .declare("test1", "fanout", false, true, false, false, None)
                .await
        })
    };

    let frame = broker.next_frame().await;
    assert_eq!(frame.channel(), 1);
    let (method, args) = method_of(&frame);
    assert_eq!(method, Method::ExchangeDeclare);

    // reserved:u16 | "test1" | "fanout" | bits(durable only) | empty table
    let expected: &[u8] = &[
        0, 0, 5, b't', b'e', b's', b't', b'1', 6, b'f', b'a', b'n', b'o', b'u', b't', 0b0000_0010,
        0, 0, 0, 0,
    ];
    assert_eq!(&args[..], expected);

    broker
        .send_method(1, Method::ExchangeDeclareOk, &[])
        .await;

    declare.await.unwrap().unwrap();
}

#[tokio::test]
async fn qos_wire_format_is_exact() {
    let (channel, mut broker) = connect();

    let qos = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.basic().qos(0, 100, false).await })
    };

    let frame = broker.next_frame().await;
    let (method, args) = method_of(&frame);
    assert_eq!(method, Method::BasicQos);
    assert_eq!(method.ids(), (60, 10));

    // prefetch-size:u32 = 0 | prefetch-count:u16 = 100 | global bit clear
    assert_eq!(&args[..], &[0, 0, 0, 0, 0, 100, 0]);

    broker.send_method(1, Method::BasicQosOk, &[]).await;
    qos.await.unwrap().unwrap();
}

#[tokio::test]
async fn second_call_waits_for_first_reply() {
    let (channel, mut broker) = connect();

    let first = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .exchange()
                .declare("a", "fanout", false, true, false, false, None)
                .await
        })
    };

    // First request is on the wire before the second call is issued.
    let frame = broker.next_frame().await;
    assert_eq!(method_of(&frame).0, Method::ExchangeDeclare);

    let second = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.basic().qos(0, 1, false).await })
    };

    // The second call is gated: nothing else reaches the broker yet.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!second.is_finished());

    broker.send_method(1, Method::ExchangeDeclareOk, &[]).await;
    first.await.unwrap().unwrap();

    // Only now does basic.qos go out.
    let frame = broker.next_frame().await;
    assert_eq!(method_of(&frame).0, Method::BasicQos);
    broker.send_method(1, Method::BasicQosOk, &[]).await;
    second.await.unwrap().unwrap();
}

#[tokio::test]
async fn queue_declare_decodes_reply_fields() {
    let (channel, mut broker) = connect();

    let mut arguments = FieldTable::new();
    arguments.insert("x-queue-mode", "lazy");
    arguments.insert("x-message-ttl", 3000);

    let declare = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .queue()
                .declare("", false, true, true, false, Some(&arguments))
                .await
        })
    };

    let frame = broker.next_frame().await;
    let (method, args) = method_of(&frame);
    assert_eq!(method, Method::QueueDeclare);

    // The request carried the argument table intact.
    let mut cursor = rabbitwire::codec::ByteCursor::new(&args);
    cursor.read_u16().unwrap(); // reserved
    assert_eq!(cursor.read_short_string().unwrap(), "");
    cursor.read_u8().unwrap(); // bits
    let table = cursor.read_field_table().unwrap();
    assert_eq!(
        table.get("x-queue-mode"),
        Some(&FieldValue::LongString("lazy".into()))
    );
    assert_eq!(table.get("x-message-ttl"), Some(&FieldValue::I32(3000)));

    let mut reply = BytesMut::new();
    reply.put_short_string("amq.gen-abc123").unwrap();
    reply.put_u32(7);
    reply.put_u32(2);
    broker.send_method(1, Method::QueueDeclareOk, &reply).await;

    let ok = declare.await.unwrap().unwrap();
    assert_eq!(ok.queue, "amq.gen-abc123");
    assert_eq!(ok.message_count, 7);
    assert_eq!(ok.consumer_count, 2);
}

#[tokio::test]
async fn consume_then_delivery_reassembles_across_body_frames() {
    let (channel, mut broker) = connect();

    let consume = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .basic()
                .consume("inbox", "", false, true, false, None)
                .await
        })
    };

    let frame = broker.next_frame().await;
    assert_eq!(method_of(&frame).0, Method::BasicConsume);

    let mut reply = BytesMut::new();
    reply.put_short_string("ctag-server-1").unwrap();
    broker.send_method(1, Method::BasicConsumeOk, &reply).await;

    let mut consumer = consume.await.unwrap().unwrap();
    assert_eq!(consumer.tag, "ctag-server-1");

    // Broker pushes a delivery split across two body frames.
    let mut deliver = BytesMut::new();
    deliver.put_short_string("ctag-server-1").unwrap();
    deliver.put_u64(99);
    deliver.put_bits(&[true]); // redelivered
    deliver.put_short_string("orders").unwrap();
    deliver.put_short_string("order.created").unwrap();
    broker.send_method(1, Method::BasicDeliver, &deliver).await;

    let properties = BasicProperties {
        content_type: Some("text/plain".into()),
        delivery_mode: Some(2),
        ..Default::default()
    };
    broker
        .send_content(1, &properties, &[b"hello ", b"world"])
        .await;

    let delivery = consumer.deliveries.recv().await.unwrap();
    assert_eq!(delivery.consumer_tag, "ctag-server-1");
    assert_eq!(delivery.delivery_tag, 99);
    assert!(delivery.redelivered);
    assert_eq!(delivery.exchange, "orders");
    assert_eq!(delivery.routing_key, "order.created");
    assert_eq!(delivery.properties, properties);
    assert_eq!(&delivery.body[..], b"hello world");
}

#[tokio::test]
async fn publish_emits_contiguous_method_header_body() {
    let (channel, mut broker) = connect();

    let properties = BasicProperties {
        content_type: Some("application/json".into()),
        ..Default::default()
    };
    channel
        .basic()
        .publish("orders", "order.created", true, false, &properties, b"{\"id\":1}")
        .await
        .unwrap();

    let frames = broker.next_frames(3).await;

    let (method, args) = method_of(&frames[0]);
    assert_eq!(method, Method::BasicPublish);
    let mut cursor = rabbitwire::codec::ByteCursor::new(&args);
    cursor.read_u16().unwrap(); // reserved
    assert_eq!(cursor.read_short_string().unwrap(), "orders");
    assert_eq!(cursor.read_short_string().unwrap(), "order.created");
    assert_eq!(cursor.read_u8().unwrap(), 0b0000_0001); // mandatory set

    assert!(frames[1].is_header());
    let mut cursor = rabbitwire::codec::ByteCursor::new(frames[1].payload());
    assert_eq!(cursor.read_u16().unwrap(), class::BASIC);
    assert_eq!(cursor.read_u16().unwrap(), 0);
    assert_eq!(cursor.read_u64().unwrap(), 8);
    let decoded = BasicProperties::decode(&mut cursor).unwrap();
    assert_eq!(decoded, properties);

    assert!(frames[2].is_body());
    assert_eq!(frames[2].payload(), b"{\"id\":1}");
}

#[tokio::test]
async fn mandatory_publish_bounce_reaches_return_hook() {
    let (channel, mut broker) = connect();
    let mut returns = channel.returns();

    let mut args = BytesMut::new();
    args.put_u16(312);
    args.put_short_string("NO_ROUTE").unwrap();
    args.put_short_string("orders").unwrap();
    args.put_short_string("nowhere").unwrap();
    broker.send_method(1, Method::BasicReturn, &args).await;
    broker
        .send_content(1, &BasicProperties::default(), &[b"lost"])
        .await;

    let returned = returns.recv().await.unwrap();
    assert_eq!(returned.reply_code, 312);
    assert_eq!(returned.reply_text, "NO_ROUTE");
    assert_eq!(&returned.body[..], b"lost");
}

#[tokio::test]
async fn eof_resolves_pending_call_with_connection_closed() {
    let (channel, broker) = connect();

    let declare = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .exchange()
                .declare("doomed", "topic", false, false, false, false, None)
                .await
        })
    };

    // Let the request hit the wire, then hang up without replying.
    let mut broker = broker;
    let _ = broker.next_frame().await;
    drop(broker);

    let err = declare.await.unwrap().unwrap_err();
    assert!(matches!(err, AmqpError::ConnectionClosed));
    assert!(channel.is_closed());
}

#[tokio::test]
async fn mismatched_reply_fails_call_and_channel() {
    let (channel, mut broker) = connect();

    let declare = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .exchange()
                .declare("e", "fanout", false, true, false, false, None)
                .await
        })
    };

    let _ = broker.next_frame().await;

    // Broker answers the wrong method.
    let mut reply = BytesMut::new();
    reply.put_short_string("q").unwrap();
    reply.put_u32(0);
    reply.put_u32(0);
    broker.send_method(1, Method::QueueDeclareOk, &reply).await;

    let err = declare.await.unwrap().unwrap_err();
    assert!(matches!(err, AmqpError::Protocol(_)));

    // The dispatcher closes the channel right after resolving the call.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(channel.is_closed());
}

#[tokio::test]
async fn every_frame_ends_with_the_sentinel() {
    let (channel, mut broker) = connect();

    channel
        .basic()
        .publish("", "q", false, false, &BasicProperties::default(), b"x")
        .await
        .unwrap();

    // Read the raw bytes and check each frame's trailer without the
    // FrameBuffer's help.
    let mut raw = Vec::new();
    let mut buf = vec![0u8; 4096];
    let mut parsed = 0;
    let mut pos = 0;
    while parsed < 3 {
        let n = broker.read.read(&mut buf).await.unwrap();
        assert!(n > 0);
        raw.extend_from_slice(&buf[..n]);

        while pos + 7 <= raw.len() {
            let len =
                u32::from_be_bytes([raw[pos + 3], raw[pos + 4], raw[pos + 5], raw[pos + 6]])
                    as usize;
            let end = pos + 7 + len;
            if end >= raw.len() {
                break;
            }
            assert_eq!(raw[end], FRAME_END);
            parsed += 1;
            pos = end + 1;
        }
    }
    assert_eq!(pos, raw.len(), "frames are back to back with no slack bytes");
}
