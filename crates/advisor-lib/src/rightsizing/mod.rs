//! Cloud instance right-sizing
//!
//! The optimizer searches an instance family for the combination that meets
//! observed demand with the least waste; the plugin applies it to impact
//! framework records.

mod optimizer;
mod plugin;

pub use optimizer::{
    optimal_combination, CombinationMember, Demand, Outcome, Recommendation, RightSizingOptimizer,
};
pub use plugin::{
    price_change_message, RightSizingConfig, RightSizingPlugin, FIELD_CPU_UTIL,
    FIELD_INSTANCE_TYPE, FIELD_LOCATION, FIELD_MEM_UTIL, FIELD_OLD_CPU_UTIL, FIELD_OLD_INSTANCE,
    FIELD_OLD_MEM_UTIL, FIELD_OUTPUT_ID, FIELD_PRICE_CHANGE, FIELD_PRICE_DIFFERENCE,
    FIELD_TARGET_CPU_UTIL, FIELD_TOTAL_MEMORY, FIELD_VENDOR, SIZE_ALREADY_OPTIMAL,
};
