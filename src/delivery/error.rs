use thiserror::Error;

/// Por que uma entrega não chegou. Nunca é repetida no lugar; quem chama
/// registra a falha no outbox.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// O serviço respondeu com status de erro.
    #[error("records service returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Sem resposta dentro do limite configurado.
    #[error("delivery timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DeliveryError::Timeout
        } else {
            DeliveryError::Network(err)
        }
    }
}
