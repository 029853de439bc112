//! Device drivers external to the kernel core: a collaborator the core links against,
//! not one of the subsystems under test here.

pub(crate) mod uart;
