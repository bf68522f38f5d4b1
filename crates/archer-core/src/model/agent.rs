/// The agent's row in the `agents` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRegistration {
    pub host: String,
    pub availability_zone: Option<String>,
    pub physical_network: String,
    pub provider: String,
}
