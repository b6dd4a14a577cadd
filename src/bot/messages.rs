//! User-facing texts.
//!
//! The bot talks to users in Russian; operator-facing strings (`/api`
//! replies) stay in English like the command itself.

use crate::error::ErrorCategory;
use crate::validation::RejectReason;

pub const WELCOME: &str = "Привет! Я PSY бот - ваш персональный психологический аналитик.

Используйте команду /psy и задайте свой вопрос, например:
/psy Почему я боюсь успеха?
/psy Как преодолеть прокрастинацию?

Я проанализирую вашу ситуацию и предоставлю глубокий психологический анализ.";

pub const HELP: &str = "Доступные команды:
/start - Начать работу с ботом
/help - Показать это сообщение
/psy [вопрос] - Получить психологический анализ
/api [провайдер] - Сменить модель

Примеры вопросов:
/psy Почему я откладываю важные дела?
/psy Как справиться с тревогой?
/psy Почему я не могу найти партнера?";

/// Sent before the completion request starts.
pub const PLEASE_WAIT: &str = "Пожалуйста, подождите, пока я обрабатываю ваш запрос...";

pub const RATE_LIMIT: &str =
    "Вы достигли лимита запросов. Пожалуйста, подождите минуту перед следующим запросом.";
pub const API_ERROR: &str = "Произошла ошибка при обработке запроса. Пожалуйста, попробуйте позже.";
pub const NETWORK_ERROR: &str = "Проблема с подключением. Проверьте интернет и попробуйте снова.";
pub const UNKNOWN_ERROR: &str = "Произошла непредвиденная ошибка. Пожалуйста, попробуйте позже.";
pub const EMPTY_QUERY: &str = "Задайте вопрос, например: /psy Почему я боюсь?";
pub const QUERY_TOO_SHORT: &str =
    "Вопрос слишком короткий. Пожалуйста, задайте более подробный вопрос.";
pub const QUERY_TOO_LONG: &str = "Вопрос слишком длинный. Пожалуйста, сделайте его короче.";
pub const INVALID_FORMAT: &str = "Пожалуйста, задайте вопрос в нормальном формате.";

/// Reply for a query refused by validation.
pub fn rejection_message(reason: RejectReason) -> &'static str {
    match reason {
        RejectReason::Empty => EMPTY_QUERY,
        RejectReason::TooShort => QUERY_TOO_SHORT,
        RejectReason::TooLong => QUERY_TOO_LONG,
        RejectReason::SpamLike => INVALID_FORMAT,
    }
}

/// Reply for a failed completion.
pub fn error_message(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Api => API_ERROR,
        ErrorCategory::Network => NETWORK_ERROR,
        ErrorCategory::Unknown => UNKNOWN_ERROR,
    }
}

/// `/api` without an argument.
pub fn api_usage(available: &[String]) -> String {
    format!("Usage: /api <provider> (available: {})", available.join(", "))
}

/// `/api` with a name that is not configured.
pub fn api_invalid(available: &[String]) -> String {
    format!("Invalid provider. Available: {}", available.join(", "))
}

/// `/api` succeeded.
pub fn api_switched(name: &str) -> String {
    format!("API provider switched to {}", name)
}
