use futures_util::StreamExt;
use tokio_test::io::Builder;
use tokio_util::codec::FramedRead;

use super::*;
use crate::call::CallId;
use crate::control::{CallResult, ControlRequest, ControlResponse, RequestPayload};

fn call_id(n: u8) -> CallId {
    CallId::from([n; 16])
}

#[test]
fn test_encoding_decoding() {
    let request = ControlRequest::new(
        call_id(1),
        RequestPayload::CallUnary {
            peer: vec![1, 2, 3],
            protocol: "/echo/1.0.0".to_owned(),
            payload: b"Hello".to_vec(),
        },
    );
    let response = ControlResponse::call_unary(call_id(1), CallResult::Payload(b"World".to_vec()));

    let mut buffer = BytesMut::new();
    let mut codec = ControlCodec::<ControlRequest>::new(DEFAULT_MAX_MESSAGE_SIZE);
    codec.encode(request.clone(), &mut buffer).unwrap();
    codec.encode(response.clone(), &mut buffer).unwrap();

    let decoded_request = codec.decode(&mut buffer).unwrap();
    assert_eq!(decoded_request, Some(request));

    let mut codec = ControlCodec::<ControlResponse>::new(DEFAULT_MAX_MESSAGE_SIZE);
    let decoded_response = codec.decode(&mut buffer).unwrap();
    assert_eq!(decoded_response, Some(response));
}

#[test]
fn test_incomplete_frame() {
    let request = ControlRequest::new(call_id(2), RequestPayload::Cancel);

    let mut buffer = BytesMut::new();
    let mut codec = ControlCodec::<ControlRequest>::new(DEFAULT_MAX_MESSAGE_SIZE);
    codec.encode(request.clone(), &mut buffer).unwrap();

    let mut partial = buffer.split_to(buffer.len() - 1);
    assert!(codec.decode(&mut partial).unwrap().is_none());

    partial.unsplit(buffer);
    assert_eq!(codec.decode(&mut partial).unwrap(), Some(request));
}

#[test]
fn test_oversize_frame_rejected() {
    let request = ControlRequest::new(
        call_id(3),
        RequestPayload::CallUnary {
            peer: vec![],
            protocol: "/big/1.0.0".to_owned(),
            payload: vec![0; 1024],
        },
    );

    let mut buffer = BytesMut::new();
    let mut codec = ControlCodec::<ControlRequest>::new(DEFAULT_MAX_MESSAGE_SIZE);
    codec.encode(request, &mut buffer).unwrap();

    let mut small = ControlCodec::<ControlRequest>::new(64);
    assert!(small.decode(&mut buffer).is_err());
}

#[tokio::test]
async fn test_multiple_objects_stream() {
    let first = ControlRequest::new(
        call_id(4),
        RequestPayload::AddUnaryHandler {
            protocol: "/p/1".to_owned(),
        },
    );
    let second = ControlRequest::new(
        call_id(5),
        RequestPayload::UnaryResponse(CallResult::Error("nope".to_owned())),
    );

    let mut buffer = BytesMut::new();
    let mut codec = ControlCodec::<ControlRequest>::new(DEFAULT_MAX_MESSAGE_SIZE);
    codec.encode(first.clone(), &mut buffer).unwrap();
    codec.encode(second.clone(), &mut buffer).unwrap();

    let mut stream = Builder::new().read(&buffer.freeze()).build();
    let mut framed = FramedRead::new(
        &mut stream,
        ControlCodec::<ControlRequest>::new(DEFAULT_MAX_MESSAGE_SIZE),
    );

    let decoded_first = framed.next().await.unwrap().unwrap();
    assert_eq!(decoded_first, first);

    let decoded_second = framed.next().await.unwrap().unwrap();
    assert_eq!(decoded_second, second);

    let decoded_third = framed.next().await;
    assert!(decoded_third.is_none());
}
