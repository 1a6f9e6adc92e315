//! Raw response blocks written back to the client in place of proxying.
//!
//! Pure formatting: lines are joined with the connection's negotiated
//! newline sequence and the block ends with one trailing newline sequence,
//! i.e. a blank line.

use chrono::Local;
use http::StatusCode;

use crate::request::reader::Newline;

const SERVER_LINE: &str = "Server: Apache";

fn date_line() -> String {
    format!("Date: {}", Local::now().format("%a, %d %b %Y %H:%M:%S"))
}

/// The canonical redirect block written when a `RedirectToNewUrl`
/// instruction is enacted.
pub fn redirect_block(status: u16, description: &str, location: &str, newline: Newline) -> String {
    let nl = newline.as_str();
    let mut block = [
        format!("HTTP/1.1 {} {}", status, description),
        SERVER_LINE.to_string(),
        date_line(),
        "Content-Length: 0".to_string(),
        format!("Location: {}", location),
        "Connection: close".to_string(),
    ]
    .join(nl);
    block.push_str(nl);
    block.push_str(nl);
    block
}

/// Minimal status block for client-notification errors.
pub fn status_block(status: StatusCode, newline: Newline) -> String {
    let nl = newline.as_str();
    let reason = status.canonical_reason().unwrap_or("Error");
    let mut block = [
        format!("HTTP/1.1 {} {}", status.as_u16(), reason),
        SERVER_LINE.to_string(),
        date_line(),
        "Content-Length: 0".to_string(),
        "Connection: close".to_string(),
    ]
    .join(nl);
    block.push_str(nl);
    block.push_str(nl);
    block
}
