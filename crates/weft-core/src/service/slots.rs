use std::sync::{Arc, Weak};

use crate::com::signature::SignalArgs;
use crate::com::slot::{HasSlots, Slot, SlotResult};
use crate::service::context::ServiceContext;
use crate::service::handle::ServiceHandle;
use crate::service::traits::Service;

/// Registrar handed to [`Service::register_slots`].
pub struct ServiceSlots<'a> {
    slots: &'a mut HasSlots,
    owner: Weak<ServiceHandle>,
}

impl<'a> ServiceSlots<'a> {
    pub(crate) fn new(slots: &'a mut HasSlots, owner: Weak<ServiceHandle>) -> Self {
        Self { slots, owner }
    }

    /// Register a slot whose body gets exclusive access to the component
    /// instance and its context. Invocations after the component has been
    /// released are skipped; invocations from the component's own hooks run
    /// once that hook returns.
    pub fn method<S, A, F>(&mut self, name: &str, f: F) -> &mut Self
    where
        S: Service,
        A: SignalArgs,
        F: Fn(&mut S, &mut ServiceContext, A) -> SlotResult + Send + Sync + 'static,
    {
        let owner = self.owner.clone();
        let f = Arc::new(f);
        let slot_name = name.to_string();
        let slot = Slot::new(name, move |args: A| {
            let owner = owner.clone();
            let f = Arc::clone(&f);
            let slot_name = slot_name.clone();
            async move {
                let Some(handle) = owner.upgrade() else {
                    return Ok(());
                };
                handle.invoke_method::<S, _>(&slot_name, move |service, ctx| (f.as_ref())(service, ctx, args))
            }
        });
        self.slots.add(slot);
        self
    }

    /// Register a free-standing slot, e.g. one closing over shared state.
    pub fn add(&mut self, slot: Arc<Slot>) -> &mut Self {
        self.slots.add(slot);
        self
    }
}
