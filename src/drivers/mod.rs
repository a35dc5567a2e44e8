// Hardware drivers, chip-independent.
//
// Each one is generic over embedded-hal / embedded-storage traits; the
// concrete pins and flash come from board/.

pub mod dht11;
pub mod flash_store;
