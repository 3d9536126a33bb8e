use interpose_macros::{proxy, PropertyTable};

mod rt {
    pub use interpose_core::*;
}

#[derive(Debug, PropertyTable)]
#[interpose(crate = "crate::rt")]
pub struct Gauge {
    pub level: u8,
}

#[proxy(crate = "crate::rt", debug)]
impl Gauge {
    pub fn empty() -> Self {
        Gauge { level: 0 }
    }

    pub fn fill(&mut self, amount: u8) -> u8 {
        self.level = self.level.saturating_add(amount);
        self.level
    }
}

fn main() {
    use crate::rt::{AccessInterceptor, Interception, Invocation};

    let mut gauge = GaugeProxy::empty();
    assert_eq!(gauge.fill(3), 3);

    gauge
        .set_prefix_interceptor("fill", |_call: &mut Invocation<'_, Gauge>| {
            Ok(Interception::returning(0))
        })
        .unwrap();
    assert_eq!(gauge.fill(3), 0);
    assert_eq!(gauge.into_wrapped_value().level, 3);
}
