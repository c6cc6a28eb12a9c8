//! The HTTP + WebSocket API.
//!
//! REST endpoints follow the `{"status": "success"|"fail"|"error", ...}`
//! envelope: validation failures are 400 with `status: "fail"`, unexpected
//! errors are 500 with `status: "error"`. The `/status` WebSocket sends one
//! `initial` frame with the whole stat history on open, then an `update`
//! snapshot every five seconds.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::dev::Server;
use actix_web::{delete, get, put, web, App, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};

use thermal::pid::Gains;

use crate::baster::Baster;
use crate::blower::Blower;
use crate::controller::{Controller, CookState};
use crate::error::Error;
use crate::probe::Probe;

/// Cadence of WebSocket status pushes.
const UPDATE_INTERVAL: Duration = Duration::from_secs(5);

/// The application state shared across all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    pub blower: Arc<Blower>,
    pub baster: Arc<Baster>,
    pub pit: Arc<Probe>,
    pub food: Vec<Arc<Probe>>,
    /// Per-food-probe alarm setpoints, unset until a client provides them.
    pub food_alarms: Arc<Mutex<Vec<Option<f64>>>>,
}

fn success(data: Value) -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": "success", "data": data}))
}

fn fail(message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(json!({
        "status": "fail",
        "data": {"message": message},
    }))
}

fn error_response(err: &Error) -> HttpResponse {
    match err {
        Error::Range(_) | Error::Config(_) => fail(&err.to_string()),
        _ => HttpResponse::InternalServerError().json(json!({
            "status": "error",
            "message": err.to_string(),
        })),
    }
}

/// The `initial` WebSocket frame: the whole stat history keyed by minute.
pub fn initial_message(state: &AppState) -> Value {
    let data: serde_json::Map<String, Value> = state
        .controller
        .get_stat_history(1)
        .iter()
        .map(|(minute, point)| {
            (
                minute.to_string(),
                json!({
                    "pit_temp": point.pit_temp,
                    "food_temp": point.food_temps,
                    "setpoint": point.setpoint,
                    "blower_speed": point.blower_speed,
                }),
            )
        })
        .collect();
    json!({"type": "initial", "data": data})
}

/// The periodic `update` WebSocket frame: a live snapshot.
pub fn update_message(state: &AppState) -> Value {
    let food_temp: Vec<Option<f64>> = state.food.iter().map(|probe| probe.get_temp().ok()).collect();
    json!({
        "type": "update",
        "data": {
            "pit_temp": state.pit.get_temp().ok(),
            "food_temp": food_temp,
            "setpoint": state.controller.get_setpoint(),
            "food_alarms": state.food_alarms.lock().clone(),
            "blower_speed": state.blower.speed(),
        },
    })
}

/// Feeds status frames to one connected browser.
struct StatusSocket {
    state: AppState,
}

impl Actor for StatusSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.text(initial_message(&self.state).to_string());
        ctx.run_interval(UPDATE_INTERVAL, |act, ctx| {
            ctx.text(update_message(&act.state).to_string());
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for StatusSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(_) => ctx.stop(),
            // The browser never sends application messages.
            _ => {}
        }
    }
}

async fn status_socket(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    ws::start(
        StatusSocket {
            state: data.get_ref().clone(),
        },
        &req,
        stream,
    )
}

#[derive(Debug, Deserialize)]
struct BasteBody {
    frequency: f64,
    duration: f64,
}

#[get("/baste")]
async fn get_baste(data: web::Data<AppState>) -> HttpResponse {
    let (frequency, duration) = data.baster.settings();
    success(json!({"frequency": frequency, "duration": duration}))
}

#[put("/baste")]
async fn put_baste(data: web::Data<AppState>, body: web::Json<BasteBody>) -> HttpResponse {
    match data.baster.config(body.frequency, body.duration) {
        Ok(()) => success(json!({"frequency": body.frequency, "duration": body.duration})),
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
struct OverrideBody {
    temperature: f64,
}

#[get("/override")]
async fn get_override(data: web::Data<AppState>) -> HttpResponse {
    let overridden = data.controller.get_state() == CookState::Override;
    let temperature = if overridden {
        data.controller.get_setpoint()
    } else {
        None
    };
    success(json!({"override": overridden, "temperature": temperature}))
}

#[put("/override")]
async fn put_override(data: web::Data<AppState>, body: web::Json<OverrideBody>) -> HttpResponse {
    match data.controller.override_temp(body.temperature) {
        Ok(()) => success(json!({"temperature": body.temperature})),
        Err(err) => error_response(&err),
    }
}

#[delete("/override")]
async fn delete_override(data: web::Data<AppState>) -> HttpResponse {
    if data.controller.get_state() != CookState::Override {
        return fail("currently not in override mode");
    }
    match data.controller.resume_profile() {
        Ok(()) => success(json!("cooking profile resumed")),
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
struct ProfileBody {
    profile: BTreeMap<String, f64>,
}

#[get("/profile")]
async fn get_profile(data: web::Data<AppState>) -> HttpResponse {
    // A downloadable profile reconstructed from what the pit actually did,
    // sampled every five minutes.
    let observed: BTreeMap<u32, f64> = data
        .controller
        .get_stat_history(5)
        .iter()
        .map(|(minute, point)| (*minute, point.pit_temp))
        .collect();
    HttpResponse::Ok()
        .content_type("application/octet-stream")
        .insert_header((
            "Content-Disposition",
            "attachment; filename=cooking_profile.json",
        ))
        .body(json!(observed).to_string())
}

#[put("/profile")]
async fn put_profile(data: web::Data<AppState>, body: web::Json<ProfileBody>) -> HttpResponse {
    let mut profile = BTreeMap::new();
    for (key, temp) in &body.profile {
        let Ok(minute) = key.parse::<u32>() else {
            return fail(&format!(
                "profile minute {key:?} is not a non-negative integer"
            ));
        };
        profile.insert(minute, *temp);
    }
    match data.controller.set_profile(profile.clone()) {
        Ok(()) => success(json!({"profile": profile})),
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
struct PidBody {
    coefficients: CoefficientsBody,
}

#[derive(Debug, Deserialize)]
struct CoefficientsBody {
    p: f64,
    i: f64,
    d: f64,
}

#[get("/pid")]
async fn get_pid(data: web::Data<AppState>) -> HttpResponse {
    let gains = data.controller.get_pid_coefficients();
    success(json!({
        "coefficients": {
            "p": gains.map(|g| g.kp),
            "i": gains.map(|g| g.ki),
            "d": gains.map(|g| g.kd),
        },
    }))
}

#[put("/pid")]
async fn put_pid(data: web::Data<AppState>, body: web::Json<PidBody>) -> HttpResponse {
    let c = &body.coefficients;
    data.controller
        .set_pid_coefficients(Gains::new(c.p, c.i, c.d));
    success(json!({"coefficients": {"p": c.p, "i": c.i, "d": c.d}}))
}

#[derive(Debug, Deserialize)]
struct AlarmsBody {
    food_alarms: Vec<f64>,
}

#[get("/alarms")]
async fn get_alarms(data: web::Data<AppState>) -> HttpResponse {
    success(json!({"food_alarms": data.food_alarms.lock().clone()}))
}

#[put("/alarms")]
async fn put_alarms(data: web::Data<AppState>, body: web::Json<AlarmsBody>) -> HttpResponse {
    let mut alarms = data.food_alarms.lock();
    if body.food_alarms.len() != alarms.len() {
        return fail(&format!(
            "expected {} food alarms, got {}",
            alarms.len(),
            body.food_alarms.len()
        ));
    }
    *alarms = body.food_alarms.iter().copied().map(Some).collect();
    success(json!({"food_alarms": alarms.clone()}))
}

fn json_config() -> web::JsonConfig {
    // Malformed bodies get the same envelope as any other validation failure.
    web::JsonConfig::default().error_handler(|err, _req| {
        let response = fail(&err.to_string());
        actix_web::error::InternalError::from_response(err, response).into()
    })
}

/// Registers every route; shared between the real server and the tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(get_baste)
        .service(put_baste)
        .service(get_override)
        .service(put_override)
        .service(delete_override)
        .service(get_profile)
        .service(put_profile)
        .service(get_pid)
        .service(put_pid)
        .service(get_alarms)
        .service(put_alarms)
        .route("/status", web::get().to(status_socket));
}

/// Starts the actix web server.
pub fn start_api_server(port: u16, app_state: AppState) -> std::io::Result<Server> {
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .configure(configure)
    })
    .bind(("0.0.0.0", port))?
    .run();
    Ok(server)
}
