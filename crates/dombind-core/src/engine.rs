//! Sync engine
//!
//! Composes the document, interaction capture, effect registry and an
//! outbound channel into one explicitly owned instance. Inbound text is
//! decoded and patched into the document; local interactions update the
//! node they target, go through capture, and leave stamped with the
//! session id.
//!
//! Nothing here is fatal: malformed messages, unresolved references and
//! unknown change types are logged and skipped so the stream continues.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::capture::{Capture, Dispatch, InteractionKind};
use crate::connection::ConnectionEvent;
use crate::dom::{Document, NodeId};
use crate::effects::EffectRegistry;
use crate::error::ResolveError;
use crate::message::{ChangeMessage, EventMessage};
use crate::patcher::{self, PatchOutcome};
use crate::resolver::resolve;

/// Destination for outbound event messages
pub trait Outbox {
    /// Hand over one stamped message; false if it was dropped
    fn deliver(&mut self, message: EventMessage) -> bool;
}

impl Outbox for Vec<EventMessage> {
    fn deliver(&mut self, message: EventMessage) -> bool {
        self.push(message);
        true
    }
}

impl Outbox for mpsc::UnboundedSender<EventMessage> {
    fn deliver(&mut self, message: EventMessage) -> bool {
        self.send(message).is_ok()
    }
}

/// A local user interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    /// Click on a node
    Click,
    /// Typing into a text input; carries the new value
    Input(String),
    /// Checking or unchecking a checkbox
    Toggle(bool),
    /// Choosing a value in a select
    Select(String),
    /// Editing a textarea; carries the new text
    Edit(String),
}

impl Interaction {
    /// DOM event the interaction raises
    pub fn kind(&self) -> InteractionKind {
        match self {
            Interaction::Click => InteractionKind::Click,
            Interaction::Input(_) => InteractionKind::Input,
            Interaction::Toggle(_) | Interaction::Select(_) | Interaction::Edit(_) => {
                InteractionKind::Change
            }
        }
    }
}

/// Input to a running engine besides connection events
#[derive(Debug)]
pub enum EngineInput {
    /// A local interaction on the node with the given reference
    Interact {
        target: String,
        interaction: Interaction,
    },
    /// Request the serialized document
    Snapshot(oneshot::Sender<String>),
}

/// Client-side sync engine
pub struct SyncEngine<O: Outbox> {
    document: Document,
    capture: Capture,
    effects: EffectRegistry,
    outbox: O,
    session_id: String,
}

impl<O: Outbox> SyncEngine<O> {
    /// Create an engine over a document, observing all of it
    ///
    /// The session id is the root element's `id`; a random one is generated
    /// if the document has none.
    pub fn new(document: Document, outbox: O) -> Self {
        Self::with_capture(document, outbox, Capture::new())
    }

    /// Create an engine with a custom set of bindings
    pub fn with_capture(document: Document, outbox: O, mut capture: Capture) -> Self {
        let session_id = document
            .session_id()
            .map(str::to_string)
            .unwrap_or_else(|| format!("dombind-{}", &uuid::Uuid::new_v4().to_string()[..8]));
        capture.observe(&document, document.root());

        Self {
            document,
            capture,
            effects: EffectRegistry::new(),
            outbox,
            session_id,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn capture(&self) -> &Capture {
        &self.capture
    }

    pub fn effects(&self) -> &EffectRegistry {
        &self.effects
    }

    /// Registry to add effect handlers to
    pub fn effects_mut(&mut self) -> &mut EffectRegistry {
        &mut self.effects
    }

    pub fn outbox(&self) -> &O {
        &self.outbox
    }

    /// Identifier stamped on every outbound message
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Decode and apply one inbound text frame
    ///
    /// Returns `None` if the frame was dropped.
    pub fn handle_inbound(&mut self, text: &str) -> Option<PatchOutcome> {
        match ChangeMessage::decode(text) {
            Ok(change) => self.apply(&change),
            Err(e) => {
                warn!("Dropping inbound message: {}", e);
                None
            }
        }
    }

    /// Apply one decoded change
    ///
    /// A trigger naming an interaction (`click`, `change`, `input`) is also
    /// dispatched through capture, as triggering that event on a bound
    /// element would be.
    pub fn apply(&mut self, change: &ChangeMessage) -> Option<PatchOutcome> {
        let outcome = match patcher::apply(
            &mut self.document,
            &mut self.capture,
            &mut self.effects,
            change,
        ) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Skipping '{}' change: {}", change.kind(), e);
                return None;
            }
        };

        if let PatchOutcome::Triggered { node, effect } = &outcome {
            if let Some(kind) = InteractionKind::from_effect(&effect.name) {
                self.dispatch(*node, kind);
            }
        }
        Some(outcome)
    }

    /// Perform a local interaction on the node with the given reference
    pub fn interact(
        &mut self,
        target: &str,
        interaction: Interaction,
    ) -> Result<Dispatch, ResolveError> {
        let node = resolve(&self.document, target)?;
        self.apply_local(node, &interaction);
        Ok(self.dispatch(node, interaction.kind()))
    }

    /// Mirror what the browser does to a control before its event fires
    fn apply_local(&mut self, node: NodeId, interaction: &Interaction) {
        match interaction {
            Interaction::Click => {}
            Interaction::Input(value) | Interaction::Select(value) => {
                self.document.set_attr(node, "value", value);
            }
            Interaction::Toggle(true) => self.document.set_attr(node, "checked", "checked"),
            Interaction::Toggle(false) => self.document.remove_attr(node, "checked"),
            Interaction::Edit(text) => self.document.set_first_text(node, text),
        }
    }

    fn dispatch(&mut self, node: NodeId, kind: InteractionKind) -> Dispatch {
        let dispatch = self.capture.dispatch(&self.document, node, kind);
        for message in &dispatch.messages {
            let stamped = message.clone().stamped(&self.session_id);
            debug!("Sending {:?} '{}' for '{}'", stamped.kind, stamped.name, stamped.reference);
            if !self.outbox.deliver(stamped) {
                debug!("Outbound '{}' for '{}' dropped", message.name, message.reference);
            }
        }
        dispatch
    }

    /// Run until the connection task or the input channel goes away
    ///
    /// Connection events and local input are handled one at a time, so a
    /// patch never interleaves with an interaction.
    pub async fn run(
        &mut self,
        mut events: mpsc::Receiver<ConnectionEvent>,
        mut inputs: mpsc::Receiver<EngineInput>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ConnectionEvent::Message(text)) => {
                        self.handle_inbound(&text);
                    }
                    Some(ConnectionEvent::StatusChanged(status)) => {
                        info!("Connection status: {:?}", status);
                    }
                    Some(ConnectionEvent::Error(e)) => {
                        warn!("Connection error: {}", e);
                    }
                    None => {
                        info!("Connection task finished");
                        return;
                    }
                },

                input = inputs.recv() => match input {
                    Some(EngineInput::Interact { target, interaction }) => {
                        if let Err(e) = self.interact(&target, interaction) {
                            warn!("Ignoring interaction: {}", e);
                        }
                    }
                    Some(EngineInput::Snapshot(reply)) => {
                        let _ = reply.send(self.document.outer_html(self.document.root()));
                    }
                    None => {
                        debug!("Input channel closed");
                        return;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{EventKind, CHECKED, ON_CLICK, TEXT, VALUE};
    use serde_json::Value;

    const PAGE: &str = r#"<html id="session-7"><body>
        <div ref="content"><a ref="go" clickable>Go</a></div>
        <input ref="r1" type="text" value="">
        <input ref="done" type="checkbox">
        <select ref="size"><option value="s">S</option><option value="m">M</option></select>
        <textarea ref="notes"></textarea>
        <p ref="r2">fading</p>
    </body></html>"#;

    fn engine() -> SyncEngine<Vec<EventMessage>> {
        SyncEngine::new(Document::parse(PAGE), Vec::new())
    }

    #[test]
    fn test_session_id_from_document() {
        assert_eq!(engine().session_id(), "session-7");
    }

    #[test]
    fn test_session_id_generated() {
        let engine = SyncEngine::new(Document::parse("<p>no id</p>"), Vec::new());
        assert!(engine.session_id().starts_with("dombind-"));
    }

    #[test]
    fn test_inbound_value_scenario() {
        let mut engine = engine();
        engine.handle_inbound(r#"{"ref":"r1","type":"update","name":"value","value":"hello"}"#);

        let node = resolve(engine.document(), "r1").unwrap();
        assert_eq!(engine.document().form_value(node), "hello");
        assert!(engine.outbox().is_empty());
    }

    #[test]
    fn test_inbound_trigger_scenario() {
        let mut engine = engine();
        let node = resolve(engine.document(), "r2").unwrap();
        let before = engine.document().outer_html(node);

        let outcome = engine.handle_inbound(r#"{"ref":"r2","type":"trigger","value":"fadeOut"}"#);

        assert!(matches!(outcome, Some(PatchOutcome::Triggered { .. })));
        assert_eq!(engine.document().outer_html(node), before);
        assert_eq!(engine.effects().fired()[0].name, "fadeOut");
    }

    #[test]
    fn test_malformed_and_unresolved_are_dropped() {
        let mut engine = engine();
        let before = engine.document().outer_html(engine.document().root());

        assert!(engine.handle_inbound("{not json").is_none());
        assert!(engine
            .handle_inbound(r#"{"ref":"missing","type":"update","name":"text","value":"x"}"#)
            .is_none());
        assert!(matches!(
            engine.handle_inbound(r#"{"ref":"r1","type":"wobble"}"#),
            Some(PatchOutcome::Ignored { .. })
        ));

        assert_eq!(engine.document().outer_html(engine.document().root()), before);
    }

    #[test]
    fn test_click_is_stamped() {
        let mut engine = engine();
        let dispatch = engine.interact("go", Interaction::Click).unwrap();

        assert!(dispatch.default_prevented);
        assert_eq!(
            engine.outbox().as_slice(),
            &[EventMessage::event("go", ON_CLICK).stamped("session-7")]
        );
    }

    #[test]
    fn test_checkbox_roundtrip() {
        let mut engine = engine();

        engine.interact("done", Interaction::Toggle(true)).unwrap();
        engine.interact("done", Interaction::Toggle(false)).unwrap();
        let sent: Vec<Option<Value>> = engine.outbox().iter().map(|m| m.value.clone()).collect();
        assert_eq!(sent, vec![Some(Value::from("checked")), Some(Value::from(""))]);
        assert!(engine.outbox().iter().all(|m| m.name == CHECKED));

        // Inbound direction
        engine.handle_inbound(r#"{"ref":"done","type":"update","name":"checked","value":"checked"}"#);
        let node = resolve(engine.document(), "done").unwrap();
        assert!(engine.document().element(node).unwrap().has_attr("checked"));

        engine.handle_inbound(r#"{"ref":"done","type":"update","name":"checked","value":""}"#);
        assert!(!engine.document().element(node).unwrap().has_attr("checked"));
    }

    #[test]
    fn test_value_interactions() {
        let mut engine = engine();
        engine.interact("r1", Interaction::Input("typed".to_string())).unwrap();
        engine.interact("size", Interaction::Select("m".to_string())).unwrap();
        engine.interact("notes", Interaction::Edit("a note".to_string())).unwrap();

        let sent: Vec<(&str, &str, Option<Value>)> = engine
            .outbox()
            .iter()
            .map(|m| (m.reference.as_str(), m.name.as_str(), m.value.clone()))
            .collect();
        assert_eq!(
            sent,
            vec![
                ("r1", VALUE, Some(Value::from("typed"))),
                ("size", VALUE, Some(Value::from("m"))),
                ("notes", TEXT, Some(Value::from("a note"))),
            ]
        );
        assert!(engine.outbox().iter().all(|m| m.kind == EventKind::Update));
    }

    #[test]
    fn test_refresh_keeps_interaction_working() {
        let mut engine = engine();
        engine.handle_inbound(
            r#"{"ref":"content","type":"refresh","value":"<a ref=\"next\" clickable>Next</a>"}"#,
        );

        assert!(engine.interact("go", Interaction::Click).is_err());
        engine.interact("next", Interaction::Click).unwrap();
        assert_eq!(
            engine.outbox().as_slice(),
            &[EventMessage::event("next", ON_CLICK).stamped("session-7")]
        );
    }

    #[test]
    fn test_trigger_click_dispatches() {
        let mut engine = engine();
        engine.handle_inbound(r#"{"ref":"go","type":"trigger","value":"click"}"#);
        assert_eq!(engine.outbox().len(), 1);
        assert_eq!(engine.outbox()[0].name, ON_CLICK);
    }

    #[test]
    fn test_click_follows_clickable_updates() {
        let mut engine = engine();

        engine.handle_inbound(r#"{"ref":"r2","type":"update","name":"attrs","value":{"clickable":"1"}}"#);
        engine.interact("r2", Interaction::Click).unwrap();
        assert_eq!(
            engine.outbox().as_slice(),
            &[EventMessage::event("r2", ON_CLICK).stamped("session-7")]
        );

        engine.handle_inbound(r#"{"ref":"go","type":"update","name":"clickable","value":null}"#);
        let dispatch = engine.interact("go", Interaction::Click).unwrap();
        assert!(dispatch.messages.is_empty());
        assert_eq!(engine.outbox().len(), 1);
    }

    #[test]
    fn test_registered_effect_handler_runs() {
        let mut engine = engine();
        let (seen_tx, seen_rx) = std::sync::mpsc::channel();
        engine.effects_mut().register("fadeOut", move |_, effect| {
            let _ = seen_tx.send(effect.name.clone());
        });

        engine.handle_inbound(r#"{"ref":"r2","type":"trigger","value":"fadeOut"}"#);
        assert_eq!(seen_rx.try_recv().unwrap(), "fadeOut");
    }

    #[test]
    fn test_custom_bindings() {
        use crate::capture::ClickBinding;

        let capture = Capture::with_bindings(vec![Box::new(ClickBinding)]);
        let mut engine = SyncEngine::with_capture(Document::parse(PAGE), Vec::new(), capture);

        engine.interact("done", Interaction::Toggle(true)).unwrap();
        assert!(engine.outbox().is_empty());
        engine.interact("go", Interaction::Click).unwrap();
        assert_eq!(engine.outbox().len(), 1);
    }

    #[test]
    fn test_interact_unknown_reference() {
        let mut engine = engine();
        let err = engine.interact("nobody", Interaction::Click).unwrap_err();
        assert!(matches!(err, ResolveError::Missing { .. }));
        assert!(engine.outbox().is_empty());
    }

    #[tokio::test]
    async fn test_run_processes_events_and_inputs() {
        let (event_tx, event_rx) = mpsc::channel(8);
        let (input_tx, input_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let mut engine = SyncEngine::new(Document::parse(PAGE), out_tx);

        let task = tokio::spawn(async move {
            engine.run(event_rx, input_rx).await;
            engine
        });

        event_tx
            .send(ConnectionEvent::Message(
                r#"{"ref":"r2","type":"update","name":"text","value":"patched"}"#.to_string(),
            ))
            .await
            .unwrap();
        input_tx
            .send(EngineInput::Interact {
                target: "go".to_string(),
                interaction: Interaction::Click,
            })
            .await
            .unwrap();

        let sent = out_rx.recv().await.unwrap();
        assert_eq!(sent.reference, "go");

        let (reply_tx, reply_rx) = oneshot::channel();
        input_tx.send(EngineInput::Snapshot(reply_tx)).await.unwrap();
        assert!(reply_rx.await.unwrap().contains("patched"));

        drop(input_tx);
        let engine = task.await.unwrap();
        let node = resolve(engine.document(), "r2").unwrap();
        assert_eq!(engine.document().text_content(node), "patched");
    }
}
