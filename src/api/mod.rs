pub(crate) mod solver;

pub use solver::Solver;

pub use crate::basic_types::Solution;
pub use crate::engine::assignments::Assignments;
pub use crate::engine::domains::DomainEvent;
pub use crate::engine::nogoods::NamedLiteral;
pub use crate::engine::nogoods::NamedNoGood;
pub use crate::engine::variables::DecisionLevel;
pub use crate::engine::variables::VariableId;
pub use crate::model::Model;
pub use crate::model::ModelError;
pub use crate::statistics::SolverStats;
