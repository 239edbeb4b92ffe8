use thiserror::Error;

/// Conditions that abort the import. Every variant names the entity, worker,
/// or collector involved so the final error message points at the culprit.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("entity {entity} is missing its {field}")]
    MissingField { entity: String, field: &'static str },

    #[error("entity {entity}: unknown snak type '{snaktype}' for property {property}")]
    UnknownSnakType {
        entity: String,
        property: String,
        snaktype: String,
    },

    #[error("entity {entity}: unexpected claim type '{claim_type}' on claim {claim}")]
    UnexpectedClaimType {
        entity: String,
        claim: String,
        claim_type: String,
    },

    #[error("unexpected {what} rows in the {collector} collector")]
    UnexpectedRows { collector: String, what: String },

    #[error("{stream} rows produced but no collector owns a {stream} file")]
    NoCollector { stream: String },

    #[error("second {relation} header in the {collector} collector")]
    DuplicateHeader { collector: String, relation: String },

    #[error("{relation} header without a {relation} file in the {collector} collector")]
    HeaderWithoutPath { collector: String, relation: String },

    #[error("{relation} row has {actual} fields, expected {expected}")]
    ColumnCount {
        relation: String,
        expected: usize,
        actual: usize,
    },

    #[error("the {0} queue closed while work was still pending")]
    QueueClosed(String),

    #[error("worker {worker} failed: {cause}")]
    WorkerFailed { worker: usize, cause: String },

    #[error("the {collector} collector failed: {cause}")]
    CollectorFailed { collector: String, cause: String },

    #[error("invalid options: {0}")]
    InvalidOptions(String),
}
