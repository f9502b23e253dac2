//! Transfer discipline detection.
//!
//! Whether a body must be streamed can be signalled at three layers: the
//! service handed over a live [`Body::Stream`], a proxied upstream declared
//! `Transfer-Encoding: chunked` in its headers, or the transport already
//! promoted that coding into [`Response::transfer_encoding`]. Each origin
//! only shows up in one place, so all three are checked.

use http::header::TRANSFER_ENCODING;

use crate::body::Body;
use crate::service::Response;

const CHUNKED: &str = "chunked";

/// Whether `rsp` must be sent as an unbounded chunked stream.
pub fn is_streaming(rsp: &Response) -> bool {
    if matches!(rsp.body, Some(Body::Stream(_))) {
        return true;
    }

    if rsp
        .headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .any(|v| v.as_bytes() == CHUNKED.as_bytes())
    {
        return true;
    }

    rsp.transfer_encoding.iter().any(|v| v == CHUNKED)
}
