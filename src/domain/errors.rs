use std::fmt;

// Failures reported by the shared key-value store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    // Connection or pool failure. Callers skip the cycle and retry later.
    Unavailable(String),
    // An atomic batch did not commit; none of its operations applied.
    TransactionAborted(String),
    // A stored record could not be encoded or decoded.
    Serialization(String),
    // The key holds a value of the other shape (string vs set).
    WrongType(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::TransactionAborted(msg) => write!(f, "transaction aborted: {msg}"),
            StoreError::Serialization(msg) => write!(f, "serialization mismatch: {msg}"),
            StoreError::WrongType(key) => write!(f, "wrong value type at key {key}"),
        }
    }
}

impl std::error::Error for StoreError {}

// Failures reported by the economy collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum EconomyError {
    Unavailable(String),
    Rejected(String),
}

impl fmt::Display for EconomyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EconomyError::Unavailable(msg) => write!(f, "economy unavailable: {msg}"),
            EconomyError::Rejected(msg) => write!(f, "economy rejected request: {msg}"),
        }
    }
}

impl std::error::Error for EconomyError {}

// Outcomes of player-initiated generator maintenance flows.
#[derive(Debug, Clone, PartialEq)]
pub enum MaintenanceError {
    NotFound,
    NotOwner,
    // A generator already exists at the location.
    Occupied,
    NotCorrupted,
    NoUpgrade,
    UnknownType(String),
    NotEnoughMoney { balance: f64, cost: f64 },
    // Another live process holds the lease for this generator.
    HeldElsewhere,
    Store(StoreError),
    Economy(EconomyError),
}

impl fmt::Display for MaintenanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaintenanceError::NotFound => write!(f, "generator not found"),
            MaintenanceError::NotOwner => write!(f, "generator belongs to another player"),
            MaintenanceError::Occupied => write!(f, "a generator already exists at this location"),
            MaintenanceError::NotCorrupted => write!(f, "generator is not corrupted"),
            MaintenanceError::NoUpgrade => write!(f, "generator is already at max tier"),
            MaintenanceError::UnknownType(id) => write!(f, "unknown generator type {id}"),
            MaintenanceError::NotEnoughMoney { balance, cost } => {
                write!(f, "not enough money: balance {balance}, cost {cost}")
            }
            MaintenanceError::HeldElsewhere => {
                write!(f, "generator is being processed by another server")
            }
            MaintenanceError::Store(err) => write!(f, "{err}"),
            MaintenanceError::Economy(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for MaintenanceError {}

impl From<StoreError> for MaintenanceError {
    fn from(err: StoreError) -> Self {
        MaintenanceError::Store(err)
    }
}

impl From<EconomyError> for MaintenanceError {
    fn from(err: EconomyError) -> Self {
        MaintenanceError::Economy(err)
    }
}
