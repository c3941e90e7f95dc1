// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A thin, reconnect-per-call wrapper around the wire protocol's
//! length-prefixed JSON framing (§4.8, §6). Workers are clients only; they
//! never accept inbound connections.

use railtrack_wire::{read_message, write_message, Request, Response};
use tokio::net::TcpStream;

use crate::error::WorkerError;

pub struct WireClient {
    stream: TcpStream,
}

impl WireClient {
    pub async fn connect(addr: &str) -> Result<Self, WorkerError> {
        let stream = TcpStream::connect(addr).await.map_err(railtrack_wire::ProtocolError::Io)?;
        Ok(Self { stream })
    }

    pub async fn call(&mut self, request: &Request) -> Result<Response, WorkerError> {
        let encoded = railtrack_wire::encode(request)?;
        write_message(&mut self.stream, &encoded).await?;
        let bytes = read_message(&mut self.stream).await?;
        Ok(railtrack_wire::decode(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railtrack_core::{WorkerId, WorkerStats};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn call_round_trips_a_heartbeat_against_a_stub_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let bytes = read_message(&mut socket).await.expect("read");
            let request: Request = railtrack_wire::decode(&bytes).expect("decode");
            assert!(matches!(request, Request::Heartbeat { .. }));
            let encoded = railtrack_wire::encode(&Response::Ack).expect("encode");
            write_message(&mut socket, &encoded).await.expect("write");
        });

        let mut client = WireClient::connect(&addr.to_string()).await.expect("connect");
        let request = Request::Heartbeat {
            worker_id: WorkerId::new("w1"),
            labels: Default::default(),
            stats: WorkerStats::default(),
            running_tasks: Vec::new(),
        };
        let response = client.call(&request).await.expect("call");
        assert_eq!(response, Response::Ack);
    }
}
