pub mod evolution;
pub mod noop;
#[cfg(test)]
pub mod recording;

use crate::domain::models::ConnectorBox;
use crate::domain::models::ConnectorName;

pub struct ConnectorManager {}

impl ConnectorManager {
    pub fn get(name: ConnectorName) -> ConnectorBox {
        if name == ConnectorName::Evolution {
            return Box::<evolution::Evolution>::default();
        }

        return Box::<noop::NoopConnector>::default();
    }
}
