//! Unified backend server.
//!
//! Composes the coordinator services into a single actix-web application:
//! game routes for QF, IR, and TL, party session routes, and the WebSocket
//! bridge for realtime session events. Transport carries no game logic;
//! every handler opens a unit of work and calls the same engine paths the
//! AI orchestrators use.
//!
//! ## Submodules
//!
//! - [`state`] — dependency wiring and composition
//! - [`dto`] — request/response shapes
//! - [`qf`] / [`ir`] / [`tl`] — per-game route handlers
//! - [`party`] — party session handlers and the WS bridge

pub mod dto;
pub mod ir;
pub mod party;
pub mod qf;
pub mod state;
pub mod tl;

pub use state::AppState;
pub use state::compose;

use actix_cors::Cors;
use actix_web::App;
use actix_web::HttpResponse;
use actix_web::HttpServer;
use actix_web::Responder;
use actix_web::middleware::Logger;
use actix_web::web;

async fn health(state: web::Data<AppState>) -> impl Responder {
    match state.database.session().await {
        Ok(client) => match client.execute("SELECT 1", &[]).await {
            Ok(_) => HttpResponse::Ok().body("ok"),
            Err(e) => {
                log::error!("health check failed: {}", e);
                HttpResponse::ServiceUnavailable().body("database unavailable")
            }
        },
        Err(e) => {
            log::error!("health check failed: {}", e);
            HttpResponse::ServiceUnavailable().body("database unavailable")
        }
    }
}

#[rustfmt::skip]
pub async fn run(state: AppState) -> Result<(), std::io::Error> {
    let state = web::Data::new(state);
    log::info!("starting unified server");
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%r %s %Ts"))
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header(),
            )
            .app_data(state.clone())
            .route("/health", web::get().to(health))
            .service(
                web::scope("/player")
                    .route("/guest", web::post().to(qf::create_guest))
                    .route("/bonus", web::post().to(qf::claim_bonus)),
            )
            .service(
                web::scope("/qf")
                    .route("/prompt/start", web::post().to(qf::start_prompt))
                    .route("/prompt/submit", web::post().to(qf::submit_prompt))
                    .route("/copy/start", web::post().to(qf::start_copy))
                    .route("/copy/submit", web::post().to(qf::submit_copy))
                    .route("/vote/start", web::post().to(qf::start_vote))
                    .route("/vote/submit", web::post().to(qf::submit_vote))
                    .route("/round/abandon", web::post().to(qf::abandon_round))
                    .route("/phrasesets/{phraseset_id}/results", web::post().to(qf::view_results))
                    .route("/hints", web::post().to(qf::buy_hints)),
            )
            .service(
                web::scope("/ir")
                    .route("/sets/join", web::post().to(ir::join_set))
                    .route("/sets/{set_id}/entries", web::post().to(ir::add_entry))
                    .route("/sets/{set_id}/votes", web::post().to(ir::add_vote))
                    .route("/sets/{set_id}/results", web::post().to(ir::view_results)),
            )
            .service(
                web::scope("/tl")
                    .route("/rounds/start", web::post().to(tl::start_round))
                    .route("/rounds/{round_id}/guess", web::post().to(tl::submit_guess))
                    .route("/rounds/{round_id}/abandon", web::post().to(tl::abandon_round)),
            )
            .service(
                web::scope("/party")
                    .route("/create", web::post().to(party::create_session))
                    .route("/{session_id}/join", web::post().to(party::join_session))
                    .route("/{session_id}/leave", web::post().to(party::leave_session))
                    .route("/{session_id}/ready", web::post().to(party::mark_ready))
                    .route("/{session_id}/start", web::post().to(party::start_session))
                    .route("/{session_id}/prompt/start", web::post().to(party::start_prompt))
                    .route("/{session_id}/prompt/submit", web::post().to(party::submit_prompt))
                    .route("/{session_id}/copy/start", web::post().to(party::start_copy))
                    .route("/{session_id}/copy/submit", web::post().to(party::submit_copy))
                    .route("/{session_id}/vote/start", web::post().to(party::start_vote))
                    .route("/{session_id}/vote/submit", web::post().to(party::submit_vote))
                    .route("/{session_id}/results", web::get().to(party::results))
                    .route("/{session_id}/ws", web::get().to(party::websocket)),
            )
    })
    .workers(6)
    .bind(std::env::var("BIND_ADDR").expect("BIND_ADDR must be set"))?
    .run()
    .await
}
