//! Wire-level fixtures: deframing and decoding the byte streams a radio
//! actually produces, end to end.

use meshcore_protocol::{
    encode_frame, is_push, Command, Event, Push, Response, StreamDeframer, MAX_FRAME_SIZE,
    PROTOCOL_VERSION,
};

fn from_radio(payload: &[u8]) -> Vec<u8> {
    let mut buf = vec![0x3E];
    buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

#[test]
fn init_command_fixtures() {
    // The exact frames an init sequence puts on the wire, before the
    // serial envelope.
    assert_eq!(
        Command::DeviceQuery {
            app_target_version: PROTOCOL_VERSION
        }
        .encode(),
        vec![22, 3]
    );

    let app_start = Command::AppStart {
        app_version: 1,
        app_name: "MeshCoreQt".to_string(),
    }
    .encode();
    assert_eq!(
        app_start,
        vec![1, 1, b'M', b'e', b's', b'h', b'C', b'o', b'r', b'e', b'Q', b't', 0]
    );

    assert_eq!(Command::GetContacts { since: 0 }.encode(), vec![4, 0, 0, 0, 0]);
    assert_eq!(Command::GetChannel { index: 0 }.encode(), vec![31, 0]);
}

#[test]
fn enveloped_command_round_trips_through_deframer() {
    // What the host writes, a firmware-side deframer (same state machine,
    // different direction byte) must recover intact. Swap the direction
    // marker to reuse ours.
    for command in [
        Command::SyncNextMessage,
        Command::SendSelfAdvert { flood: true },
        Command::GetContacts { since: 12345 },
        Command::SetAdvertName {
            name: "Base Camp".to_string(),
        },
    ] {
        let frame = command.encode();
        let mut enveloped = encode_frame(&frame).unwrap();
        assert_eq!(enveloped[0], 0x3C);
        enveloped[0] = 0x3E;

        let mut deframer = StreamDeframer::new();
        deframer.push(&enveloped);
        assert_eq!(deframer.next_frame().unwrap(), frame);
        assert!(deframer.next_frame().is_none());
    }
}

#[test]
fn mixed_stream_with_noise_pushes_and_responses() {
    // A realistic inbound stream: line noise, a push, a response, more
    // noise, an oversize frame, then a clean frame.
    let mut stream = vec![0x00, 0x7F, 0x41];
    stream.extend_from_slice(&from_radio(&[0x83])); // MSG_WAITING push
    stream.extend_from_slice(&from_radio(&[0x00])); // OK response
    stream.extend_from_slice(&[0x13, 0x37]);

    // Declared 176 bytes of 0xAA (over the cap), supplied in full.
    stream.extend_from_slice(&[0x3E, 0xB0, 0x00]);
    stream.extend_from_slice(&[0xAA; 176]);

    stream.extend_from_slice(&from_radio(&[0x0A])); // NO_MORE_MESSAGES

    let mut deframer = StreamDeframer::new();
    deframer.push(&stream);

    let mut frames = Vec::new();
    while let Some(frame) = deframer.next_frame() {
        assert!(frame.len() <= MAX_FRAME_SIZE);
        frames.push(frame);
    }
    assert_eq!(frames.len(), 4);

    assert!(is_push(&frames[0]));
    assert_eq!(Event::decode(&frames[0]).unwrap(), Event::Push(Push::MessageWaiting));
    assert_eq!(
        Event::decode(&frames[1]).unwrap(),
        Event::Response(Response::Ok)
    );
    assert_eq!(frames[2].len(), MAX_FRAME_SIZE);
    assert_eq!(
        Event::decode(&frames[3]).unwrap(),
        Event::Response(Response::NoMoreMessages)
    );
}

#[test]
fn channel_message_through_the_whole_inbound_path() {
    let mut payload = vec![
        0x11u8, 0x14, 0x00, 0x00, 0x00, 0xFF, 0x00, 0xEF, 0xBE, 0xAD, 0xDE,
    ];
    payload.extend_from_slice(b"Alice: hi\0");

    let mut deframer = StreamDeframer::new();
    deframer.push(&from_radio(&payload));
    let frame = deframer.next_frame().unwrap();
    assert!(!is_push(&frame));

    let msg = match Event::decode(&frame).unwrap() {
        Event::Response(Response::ChannelMessage(msg)) => msg,
        other => panic!("expected channel message, got {:?}", other),
    };
    assert_eq!(msg.channel_idx, 0);
    assert_eq!(msg.path_len, 0xFF);
    assert_eq!(msg.timestamp, 0xDEADBEEF);
    assert_eq!(msg.snr(), 5.0);
    assert_eq!(msg.text, "Alice: hi");
}
