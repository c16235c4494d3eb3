use crate::container::ContainerID;
use crate::probe;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no snapshot entry for container `{0}`")]
    NotFound(ContainerID),
    #[error(transparent)]
    Probe(#[from] probe::Error),
}
