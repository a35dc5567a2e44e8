// Configuration portal served from the provisioning access point
//
//   GET  /      form, pre-filled from the stored profile
//   POST /save  validate, persist, restart
//
// Routing is pure: the board owns the socket and feeds raw requests in.

pub mod form;
pub mod http;
pub mod page;

use crate::provisioning::{Provisioner, Restart};
use crate::store::KvStore;

pub use http::{HttpError, Method, Request, Response, Status};

pub const PORT: u16 = 80;
pub const AP_ADDRESS: [u8; 4] = [192, 168, 4, 1];
pub const AP_PREFIX_LEN: u8 = 24;

/// Receive buffer for one request; the form body is well under 1 KiB.
pub const REQUEST_BUF: usize = 2048;

/// Answer one request. A restart is returned only after a successful save.
pub fn handle<S: KvStore>(
    provisioner: &mut Provisioner<S>,
    req: &Request<'_>,
) -> (Response, Option<Restart>) {
    log::info!("portal: {:?} {}", req.method, req.path);
    match (req.path, req.method) {
        ("/", Method::Get) => (
            Response::html(
                Status::Ok,
                page::form(provisioner.identity(), provisioner.profile()),
            ),
            None,
        ),
        ("/save", Method::Post) => {
            let submission = form::submission(req.body);
            match provisioner.submit(&submission) {
                Ok(restart) => (
                    Response::html(
                        Status::Ok,
                        page::saved(&submission.ssid, provisioner.profile()),
                    ),
                    Some(restart),
                ),
                Err(e) => {
                    log::warn!("portal: rejected submission: {}", e);
                    (Response::html(Status::BadRequest, page::error(&e)), None)
                }
            }
        }
        ("/" | "/save", _) => (
            Response::html(Status::MethodNotAllowed, page::method_not_allowed()),
            None,
        ),
        _ => (Response::html(Status::NotFound, page::not_found()), None),
    }
}

/// Response for bytes that never became a request.
pub fn reject(err: HttpError) -> Response {
    log::warn!("portal: {}", err);
    Response::html(Status::BadRequest, page::bad_request())
}
