//! WebSocket upgrade with optional request authentication.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_tungstenite::{
    WebSocketStream,
    tungstenite::{
        self,
        handshake::server::{ErrorResponse, Request, Response},
        http::{HeaderValue, StatusCode, header::SEC_WEBSOCKET_PROTOCOL},
    },
};

/// Decides whether an upgrade request may proceed. Returning `false`
/// answers the handshake with `401 Unauthorized`.
pub type WebSocketAuth = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Complete the HTTP upgrade on `stream`, consulting `auth` first.
///
/// When the client offers subprotocols the first one is echoed back, since
/// browsers abort a handshake whose response names none.
pub(super) async fn upgrade(
    stream: TcpStream,
    auth: Option<WebSocketAuth>,
) -> Result<WebSocketStream<TcpStream>, tungstenite::Error> {
    tokio_tungstenite::accept_hdr_async(
        stream,
        move |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
            match &auth {
                Some(check) if !check(req) => {
                    log::warn!("websocket upgrade rejected: uri={}", req.uri());
                    Err(unauthorized())
                }
                _ => Ok(select_subprotocol(req, response)),
            }
        },
    )
    .await
}

fn unauthorized() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(String::from("unauthorized")));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
}

fn select_subprotocol(req: &Request, mut response: Response) -> Response {
    let chosen = req
        .headers()
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .find(|protocol| !protocol.is_empty())
        .and_then(|protocol| HeaderValue::from_str(protocol).ok());
    if let Some(protocol) = chosen {
        response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
    }
    response
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tokio_tungstenite::tungstenite::{
        handshake::server::{Request, Response},
        http::header::SEC_WEBSOCKET_PROTOCOL,
    };

    use super::select_subprotocol;

    #[rstest]
    #[case::single(Some("wirepump.v1"), Some("wirepump.v1"))]
    #[case::list(Some("wirepump.v2, wirepump.v1"), Some("wirepump.v2"))]
    #[case::none(None, None)]
    fn first_offered_subprotocol_is_echoed(
        #[case] offered: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        let mut builder = Request::builder().uri("/");
        if let Some(offered) = offered {
            builder = builder.header(SEC_WEBSOCKET_PROTOCOL, offered);
        }
        let req = builder.body(()).expect("request");
        let response = select_subprotocol(&req, Response::new(()));
        let echoed = response
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .map(|value| value.to_str().expect("ascii header"));
        assert_eq!(echoed, expected);
    }
}
