use serde::Deserialize;
use std::env;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub store: StoreConfig,
    pub admin: AdminConfig,
    pub ticketing: TicketingConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub rust_log: String,
}

// Настройки хранилища броней: postgres | sqlite | json
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: String,
    pub database_url: Option<String>,
    pub json_path: String,
    pub pool_size: u32,
}

// Общий админский секрет для подтверждения оплат и realtime-канала
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub password: String,
}

// Настройки генерации билетов и доставки через WhatsApp-провайдера
#[derive(Debug, Clone, Deserialize)]
pub struct TicketingConfig {
    pub provider_url: String,
    pub api_token: String,
    pub artifact_dir: String,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub total_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .expect("PORT must be a valid number"),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "stolovka=debug,tower_http=debug".to_string()),
            },
            store: StoreConfig {
                backend: env::var("STORE_BACKEND").unwrap_or_else(|_| "json".to_string()),
                database_url: env::var("DATABASE_URL").ok(),
                json_path: env::var("BOOKINGS_JSON_PATH")
                    .unwrap_or_else(|_| "data/bookings.json".to_string()),
                pool_size: env::var("DB_POOL_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .expect("DB_POOL_SIZE must be a valid number"),
            },
            admin: AdminConfig {
                password: env::var("ADMIN_PASSWORD").expect("ADMIN_PASSWORD must be set"),
            },
            ticketing: TicketingConfig {
                provider_url: env::var("TICKET_PROVIDER_URL")
                    .unwrap_or_else(|_| "https://api.whatsapp-provider.local/v1/send".to_string()),
                api_token: env::var("TICKET_PROVIDER_TOKEN").unwrap_or_default(),
                artifact_dir: env::var("TICKET_ARTIFACT_DIR")
                    .unwrap_or_else(|_| "data/tickets".to_string()),
                max_attempts: env::var("TICKET_DELIVERY_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .expect("TICKET_DELIVERY_ATTEMPTS must be a valid number"),
                base_delay_ms: env::var("TICKET_DELIVERY_BASE_DELAY_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .expect("TICKET_DELIVERY_BASE_DELAY_MS must be a valid number"),
                total_timeout_secs: env::var("TICKET_DELIVERY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .expect("TICKET_DELIVERY_TIMEOUT_SECS must be a valid number"),
            },
        }
    }
}
