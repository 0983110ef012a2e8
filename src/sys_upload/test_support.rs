//! Hand-built multipart bodies for tests.

use hyper::{Body, Method, Request, header::CONTENT_TYPE};
use multer::Multipart;

pub const BOUNDARY: &str = "smn-events-test-boundary";

pub struct FormBody {
    buf: Vec<u8>,
}

impl FormBody {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.buf.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, filename: &str, mime: &str, data: &[u8]) -> Self {
        self.buf.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.buf
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        self.buf
    }

    pub fn multipart(self) -> Multipart<'static> {
        Multipart::new(Body::from(self.finish()), BOUNDARY)
    }

    pub fn request(self, uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(self.finish()))
            .unwrap()
    }
}
