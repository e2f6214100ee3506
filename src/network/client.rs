//! TCP Client
//!
//! Blocking client for the frame protocol, used by the CLI and tests.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use crate::error::{MpdbError, Result};
use crate::protocol::{read_frame, write_request, CommandType, Frame, Request, Response};

pub struct Client {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl Client {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
        })
    }

    /// Read timeout for [`Client::recv`] (0 disables)
    pub fn set_timeout(&self, ms: u64) -> Result<()> {
        let timeout = (ms > 0).then(|| Duration::from_millis(ms));
        self.reader.get_ref().set_read_timeout(timeout)?;
        Ok(())
    }

    pub fn send(&mut self, request: &Request) -> Result<()> {
        write_request(&mut self.writer, request)
    }

    /// Block until the next frame arrives
    pub fn recv(&mut self) -> Result<Frame> {
        read_frame(&mut self.reader)
    }

    /// Send a JSON request and wait for its frame
    pub fn request(&mut self, kind: CommandType, payload: &Value) -> Result<Frame> {
        self.send(&Request::json(kind, payload))?;
        self.recv()
    }

    /// Send a JSON request and wait for its response frame
    pub fn call(&mut self, kind: CommandType, payload: &Value) -> Result<Response> {
        expect_response(self.request(kind, payload)?)
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<Response> {
        self.call(
            CommandType::Login,
            &serde_json::json!({ "username": username, "password": password }),
        )
    }

    /// Export the selected subtree as JSON
    pub fn export(&mut self, selector: &Value) -> Result<Value> {
        match self.request(CommandType::Export, selector)? {
            Frame::Export(buffer) => Ok(serde_json::from_slice(&buffer)?),
            Frame::Response(response) => Err(MpdbError::Protocol(format!(
                "Export failed ({}): {}",
                response.response, response.message
            ))),
            Frame::Shutdown => Err(shutdown()),
        }
    }

    /// Send newline-delimited JSON create payloads
    pub fn import(&mut self, ndjson: impl Into<Bytes>) -> Result<Response> {
        self.send(&Request::raw(CommandType::Import, ndjson))?;
        expect_response(self.recv()?)
    }
}

fn expect_response(frame: Frame) -> Result<Response> {
    match frame {
        Frame::Response(response) => Ok(response),
        Frame::Export(_) => Err(MpdbError::Protocol("Unexpected export frame".to_string())),
        Frame::Shutdown => Err(shutdown()),
    }
}

fn shutdown() -> MpdbError {
    MpdbError::Protocol("Server is shutting down".to_string())
}
