use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, RequestConfirmedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub request_confirmed_producer: Vec<EventProducer<RequestConfirmedEvent>>,
}

impl EventProducers {
    pub async fn publish_request_confirmed(&self, event: RequestConfirmedEvent) {
        for producer in &self.request_confirmed_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_request_confirmed: Option<EventHandler<RequestConfirmedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_request_confirmed = hooks.on_request_confirmed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_request_confirmed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_request_confirmed {
            result.request_confirmed_producer.push(handler.subscribe());
        }
        result
    }

    pub fn start_handlers(self) {
        if let Some(handler) = self.on_request_confirmed {
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_request_confirmed: Option<Handler<RequestConfirmedEvent>>,
}

impl EventHooks {
    pub fn on_request_confirmed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RequestConfirmedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_request_confirmed = Some(Arc::new(f));
        self
    }
}
