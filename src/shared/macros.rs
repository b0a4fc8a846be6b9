/***************************************/
/*               Macros                */
/***************************************/
/// Unwraps a `Result` or terminates the process. Reserved for failures the
/// node cannot run without, like losing the hardware connection.
#[macro_export]
macro_rules! unwrap_or_exit {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(e) => {
                log::error!("FATAL: {}", e);
                std::process::exit(1);
            }
        }
    };
}
