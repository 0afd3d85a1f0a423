use std::{
    collections::HashMap,
    net::{IpAddr, SocketAddr},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{
    extract::{Query, State},
    http::header::{CONTENT_TYPE, SET_COOKIE, USER_AGENT},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use metrobus_scraper::{CardError, CardNumber, CardService, HttpPortal, PortalConfig};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

const BASE_PATH: &str = "/PortalCAE-WAR-MODULE";
const KNOWN_CARD: &str = "33070524";
const TOKEN: &str = "KSI-0001";

const SESSION_PAGE: &str = r#"<html><body>
    <form name="f"><input type="hidden" name="KSI" value="KSI-0001"></form>
    <table>
      <tr><td>No. Tarjeta:</td><td>33070524</td><td>Estado de contrato:</td><td>Activo</td></tr>
      <tr><td>Saldo  tarjeta:</td><td>B/. 4.35</td><td>Fecha saldo:</td><td>17/10/2026 18:00</td></tr>
    </table></body></html>"#;

const INVALID_CARD_PAGE: &str = "<html><body><p>Numero de tarjeta invalido</p></body></html>";

const RESUME_PAGE: &str = r#"<html><body>
    <table>
      <tr><td>No. Tarjeta:</td><td>33070524</td><td>Estado tarjeta:</td><td>Activa</td></tr>
      <tr><td>Tipo de tarjeta:</td><td>Estudiante</td><td>Saldo tarjeta:</td><td>B/. 4.35</td></tr>
    </table>
    <table>
      <tr><td><b>Monto utilizado</b></td></tr>
      <tr><td></td><td>Agosto</td><td>Septiembre</td><td>Octubre</td></tr>
      <tr><td></td><td>11.00</td><td>12.25</td><td>4.00</td></tr>
      <tr><td></td><td>44</td><td>49</td><td>16</td></tr>
    </table>
    <table>
      <tr><td><b>Monto cargado</b></td></tr>
      <tr><td></td><td>Agosto</td><td>Septiembre</td><td>Octubre</td></tr>
      <tr><td></td><td>10.00</td><td>15.00</td><td>5.00</td></tr>
      <tr><td></td><td>1</td><td>2</td><td>1</td></tr>
    </table></body></html>"#;

const MOVEMENTS_PAGE: &str = r#"<html><body><table>
    <tr><td><b>Saldos y movimientos</b></td></tr>
    <tr><td>&nbsp;</td><td>No. Transacción</td><td>Movimiento</td><td>Fecha y hora</td><td>Lugar</td><td>Monto</td><td>Saldo tarjeta</td></tr>
    <tr><td>&nbsp;</td><td>5120</td><td>Uso</td><td>17/10/2026 07:41</td><td>Estación San Miguelito</td><td>-0.35</td><td>4.35</td></tr>
    <tr><td>&nbsp;</td><td>5119</td><td>Recarga</td><td>16/10/2026 19:02</td><td>Punto de recarga</td><td>5.00</td><td>4.70</td></tr>
    <tr><td colspan="7">&nbsp;</td></tr>
    </table></body></html>"#;

#[derive(Clone, Default)]
struct StubState {
    primes: Arc<AtomicUsize>,
    session_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    ledger_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    user_agents: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

struct StubPortal {
    state: StubState,
    base_url: Url,
    cnx: CancellationToken,
}

impl StubPortal {
    async fn start(state: StubState) -> StubPortal {
        let ip_addr = IpAddr::from([127, 0, 0, 1]);
        let listener = TcpListener::bind((ip_addr, 0)).await.expect("bind");
        let addr: SocketAddr = listener.local_addr().expect("local addr");
        let base_url = Url::parse(&format!("http://{addr}{BASE_PATH}")).expect("base url");

        let app = Router::new()
            .route(BASE_PATH, get(landing))
            .route(&format!("{BASE_PATH}/SesionPortalServlet"), get(session))
            .route(&format!("{BASE_PATH}/ComercialesPortalServlet"), get(commerce))
            .with_state(state.clone());

        let cnx = CancellationToken::new();
        let shutdown = cnx.clone().cancelled_owned();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
        });

        StubPortal {
            state,
            base_url,
            cnx,
        }
    }

    fn service(&self, timeout_secs: u64) -> CardService {
        let config = PortalConfig {
            base_url: self.base_url.clone(),
            timeout_secs,
            ..PortalConfig::default()
        };
        CardService::new(HttpPortal::new(config))
    }
}

impl Drop for StubPortal {
    fn drop(&mut self) {
        self.cnx.cancel();
    }
}

async fn landing(State(state): State<StubState>) -> Response {
    let n = state.primes.fetch_add(1, Ordering::SeqCst);
    (
        [(SET_COOKIE, format!("JSESSIONID=stub{n}; Path=/"))],
        "Portal",
    )
        .into_response()
}

async fn session(
    State(state): State<StubState>,
    headers: HeaderMap,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }
    if let Some(ua) = headers.get(USER_AGENT).and_then(|v| v.to_str().ok()) {
        state.user_agents.lock().unwrap().push(ua.to_owned());
    }
    let known = q.get("NumTarjeta").map(String::as_str) == Some(KNOWN_CARD);
    state.session_queries.lock().unwrap().push(q);
    let page = if known { SESSION_PAGE } else { INVALID_CARD_PAGE };
    ([(CONTENT_TYPE, "text/html; charset=utf-8")], Html(page)).into_response()
}

async fn commerce(
    State(state): State<StubState>,
    Query(q): Query<HashMap<String, String>>,
) -> Response {
    let page = match (
        q.get("KSI").map(String::as_str),
        q.get("itemms").map(String::as_str),
    ) {
        (Some(TOKEN), Some("2000")) => Some(RESUME_PAGE),
        (Some(TOKEN), Some("3000")) => Some(MOVEMENTS_PAGE),
        _ => None,
    };
    state.ledger_queries.lock().unwrap().push(q);
    match page {
        Some(page) => Html(page).into_response(),
        None => (StatusCode::INTERNAL_SERVER_ERROR, "Sesion invalida").into_response(),
    }
}

fn card(n: &str) -> CardNumber {
    n.parse().unwrap()
}

#[tokio::test]
async fn card_info_primes_a_session_and_parses_the_balance() {
    let portal = StubPortal::start(StubState::default()).await;

    let info = portal.service(5).card_info(&card(KNOWN_CARD)).await.unwrap();

    assert_eq!(info.card_number, KNOWN_CARD);
    assert_eq!(info.balance, "B/. 4.35");
    assert_eq!(info.balance_as_of_date, "17/10/2026 18:00");
    assert_eq!(portal.state.primes.load(Ordering::SeqCst), 1);
    assert!(portal.state.ledger_queries.lock().unwrap().is_empty());

    let user_agents = portal.state.user_agents.lock().unwrap();
    assert!(user_agents[0].starts_with("Mozilla/5.0"), "{user_agents:?}");
}

#[tokio::test]
async fn movements_round_trip_through_both_servlets() {
    let portal = StubPortal::start(StubState::default()).await;

    let movements = portal.service(5).movements(&card(KNOWN_CARD)).await.unwrap();

    assert_eq!(movements.len(), 2);
    assert_eq!(movements[0].transaction_id, "5120");
    assert_eq!(movements[0].place, "Estación San Miguelito");
    assert_eq!(movements[1].movement_type, "Recarga");
    assert_eq!(movements[1].balance_after, "4.70");

    // One session for the token, a second one for the ledger.
    assert_eq!(portal.state.primes.load(Ordering::SeqCst), 2);
    let ledger = portal.state.ledger_queries.lock().unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0]["KSI"], TOKEN);
    assert_eq!(ledger[0]["DiasMov"], "45");
    assert_eq!(ledger[0]["fechalogeo"].len(), 14);
}

#[tokio::test]
async fn resume_and_stats_read_the_same_page() {
    let portal = StubPortal::start(StubState::default()).await;
    let service = portal.service(5);

    let resume = service.card_resume(&card(KNOWN_CARD)).await.unwrap();
    assert_eq!(resume.card_type, "Estudiante");
    assert_eq!(resume.card_status, "Activa");

    let stats = service.stats(&card(KNOWN_CARD)).await.unwrap();
    assert_eq!(stats.uses.len(), 3);
    assert_eq!(stats.uses[2].month, "Octubre");
    assert_eq!(stats.uses[2].count, "16");
    assert_eq!(stats.charges[1].amount, "15.00");
}

#[tokio::test]
async fn invalid_card_is_not_found() {
    let portal = StubPortal::start(StubState::default()).await;

    let err = portal.service(5).card_resume(&card("1")).await.unwrap_err();

    assert!(err.is_not_found(), "{err:?}");
    assert!(portal.state.ledger_queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn slow_session_servlet_times_out_as_upstream_unavailable() {
    let state = StubState {
        delay: Some(Duration::from_secs(3)),
        ..StubState::default()
    };
    let portal = StubPortal::start(state).await;

    let err = portal.service(1).movements(&card(KNOWN_CARD)).await.unwrap_err();

    assert!(matches!(err, CardError::UpstreamUnavailable { .. }), "{err:?}");
    assert!(portal.state.ledger_queries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_cards_use_separate_sessions() {
    let portal = StubPortal::start(StubState::default()).await;
    let service = portal.service(5);
    let (known, unknown) = (card(KNOWN_CARD), card("999"));

    let (a, b) = tokio::join!(service.card_info(&known), service.card_info(&unknown));

    assert!(a.is_ok());
    assert!(b.unwrap_err().is_not_found());
    assert_eq!(portal.state.primes.load(Ordering::SeqCst), 2);
    let mut cards = portal
        .state
        .session_queries
        .lock()
        .unwrap()
        .iter()
        .map(|q| q["NumTarjeta"].clone())
        .collect::<Vec<_>>();
    cards.sort();
    assert_eq!(cards, ["33070524", "999"]);
}
