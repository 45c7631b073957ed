pub mod origin_guard;

pub use origin_guard::{
    admin_only, cron_only, require, require_all, task_queue_only, GuardedRouter,
};
