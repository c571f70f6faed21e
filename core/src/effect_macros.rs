//! Declarative macros for ergonomic effect construction

/// Create an `Effect::Future` from an async block body
///
/// The body is wrapped in `async move` and boxed, and must evaluate to
/// `Option<Action>`.
///
/// # Example
///
/// ```rust,ignore
/// use queuepass_core::async_effect;
///
/// async_effect! {
///     writer.write(snapshot).await;
///     None
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;

    #[derive(Clone, Debug)]
    enum TestAction {
        Persisted,
    }

    #[test]
    fn test_async_effect_macro() {
        let effect = async_effect! {
            Some(TestAction::Persisted)
        };

        assert!(matches!(effect, Effect::Future(_)));
    }

    #[test]
    fn test_async_effect_macro_resolves() {
        let effect = async_effect! {
            Some(TestAction::Persisted)
        };

        let Effect::Future(fut) = effect else {
            unreachable!("async_effect! always builds a Future effect");
        };
        let output = tokio_test::block_on(fut);
        assert!(matches!(output, Some(TestAction::Persisted)));
    }
}
