use crate::events::EventRepository;
use crate::identities::IdentityRepository;

pub trait Store {
    type Events<'a>: EventRepository
    where
        Self: 'a;
    type Identities<'a>: IdentityRepository
    where
        Self: 'a;

    fn events(&self) -> Self::Events<'_>;
    fn identities(&self) -> Self::Identities<'_>;
}
