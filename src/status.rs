//! HTTP status codes as a typed enum.
//!
//! Use [`Status`] anywhere a status code is accepted:
//!
//! ```rust
//! use fcodex::{Response, Status};
//!
//! let res = Response::new();
//! res.status(Status::Created).set_header("location", "/users/42");
//! res.json(&serde_json::json!({ "id": 42 }));
//! assert_eq!(res.status_code(), 201);
//! ```

macro_rules! statuses {
    ($($variant:ident = $code:literal, $reason:literal;)+) => {
        /// IANA-registered HTTP status codes.
        #[allow(clippy::enum_variant_names)]
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        pub enum Status {
            $($variant,)+
        }

        impl Status {
            /// The numeric code, e.g. `404`.
            pub fn code(self) -> u16 {
                match self {
                    $(Self::$variant => $code,)+
                }
            }

            /// The canonical reason phrase, e.g. `"Not Found"`.
            pub fn reason(self) -> &'static str {
                match self {
                    $(Self::$variant => $reason,)+
                }
            }

            /// Looks up a registered status by its numeric code.
            pub fn from_code(code: u16) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

statuses! {
    Continue                      = 100, "Continue";
    SwitchingProtocols            = 101, "Switching Protocols";
    Ok                            = 200, "OK";
    Created                       = 201, "Created";
    Accepted                      = 202, "Accepted";
    NoContent                     = 204, "No Content";
    PartialContent                = 206, "Partial Content";
    MovedPermanently              = 301, "Moved Permanently";
    Found                         = 302, "Found";
    SeeOther                      = 303, "See Other";
    NotModified                   = 304, "Not Modified";
    TemporaryRedirect             = 307, "Temporary Redirect";
    PermanentRedirect             = 308, "Permanent Redirect";
    BadRequest                    = 400, "Bad Request";
    Unauthorized                  = 401, "Unauthorized";
    Forbidden                     = 403, "Forbidden";
    NotFound                      = 404, "Not Found";
    MethodNotAllowed              = 405, "Method Not Allowed";
    NotAcceptable                 = 406, "Not Acceptable";
    RequestTimeout                = 408, "Request Timeout";
    Conflict                      = 409, "Conflict";
    Gone                          = 410, "Gone";
    PreconditionFailed            = 412, "Precondition Failed";
    ContentTooLarge               = 413, "Content Too Large";
    UnsupportedMediaType          = 415, "Unsupported Media Type";
    UnprocessableContent          = 422, "Unprocessable Content";
    TooManyRequests               = 429, "Too Many Requests";
    InternalServerError           = 500, "Internal Server Error";
    NotImplemented                = 501, "Not Implemented";
    BadGateway                    = 502, "Bad Gateway";
    ServiceUnavailable            = 503, "Service Unavailable";
    GatewayTimeout                = 504, "Gateway Timeout";
}

impl From<Status> for u16 {
    fn from(s: Status) -> u16 {
        s.code()
    }
}

impl From<Status> for http::StatusCode {
    fn from(s: Status) -> http::StatusCode {
        // Every code in the table is within 100..=599.
        http::StatusCode::from_u16(s.code()).unwrap_or(http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_and_reason_agree() {
        assert_eq!(Status::Unauthorized.code(), 401);
        assert_eq!(Status::Unauthorized.reason(), "Unauthorized");
        assert_eq!(Status::from_code(404), Some(Status::NotFound));
        assert_eq!(Status::from_code(599), None);
        assert_eq!(http::StatusCode::from(Status::NoContent), http::StatusCode::NO_CONTENT);
    }
}
