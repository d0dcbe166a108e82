use charla::client::config::ClientConfig;
use charla::client::gui::app::{AppFlags, ChatApp};
use charla::utils::logger::CharlaLogger;
use iced::Application;

fn main() -> iced::Result {
    // load environment from .env (optional)
    let config = ClientConfig::from_env();
    if let Err(e) = CharlaLogger::init(&config.log_level) {
        eprintln!("[APP] Logger setup failed: {}", e);
    }
    let service = match config.build_service() {
        Ok(service) => service,
        Err(e) => {
            log::error!("[APP] {:#}", e);
            eprintln!("[APP] {:#}", e);
            std::process::exit(1);
        }
    };
    let identity = config.build_identity();
    ChatApp::run(iced::Settings::with_flags(AppFlags { service, identity }))
}
