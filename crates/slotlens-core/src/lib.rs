pub mod domain;
pub mod types;

pub use domain::conditions::{ConditionLeaf, ConditionTree, Rule};
pub use domain::evaluation::{EvaluationInput, EvaluationOutcome, evaluate_slots};
pub use domain::slots::generate_slots;
pub use domain::validation::{
    ConditionTreeInput, ValidationError, ValidationScope, validate_condition_tree,
};
pub use types::{
    Appointment, AppointmentId, AppointmentStatus, AppointmentType, AppointmentTypeId,
    BaseSchedule, BaseScheduleId, BookingContext, BreakTime, ConditionOperator, ConditionScope,
    ConditionType, DateRange, Location, LocationId, NodeType, PatientContext, Practice,
    PracticeId, Practitioner, PractitionerId, RuleNode, RuleNodeId, RuleSet, RuleSetId, Slot,
    SlotStatus, TimeOfDay,
};
