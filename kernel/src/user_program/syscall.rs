use crate::machine::{Machine, ARG1_REG, RET_REG};
use osmos_shared::{eprintln, println};

// Syscall numbers, part of the user-program ABI.
pub const SC_HALT: i32 = 0;
pub const SC_EXIT: i32 = 1;
pub const SC_PRINT_INT: i32 = 2;
pub const SC_SLEEP: i32 = 3;

/// The kernel services the syscall layer wraps. The wrappers are thin by
/// design; everything interesting happens behind this trait.
pub trait SystemServices {
    fn halt(&mut self);
    fn exit(&mut self, status: i32);
    fn print_int(&mut self, value: i32);
    fn sleep(&mut self, ticks: i32);
}

/// Console-backed services used by the demo binary.
#[derive(Default)]
pub struct ConsoleServices {
    pub halted: bool,
    pub exit_status: Option<i32>,
}

impl SystemServices for ConsoleServices {
    fn halt(&mut self) {
        println!("Shutdown, initiated by user program.");
        self.halted = true;
    }

    fn exit(&mut self, status: i32) {
        println!("return value: {}", status);
        self.exit_status = Some(status);
    }

    fn print_int(&mut self, value: i32) {
        println!("Print integer: {}", value);
    }

    fn sleep(&mut self, ticks: i32) {
        println!("Sleep for: {}", ticks);
    }
}

/// Process one syscall trap: the code arrives in r2, the first argument in
/// r4, and the PC must be stepped past the trapping instruction before
/// returning to user mode.
pub fn handler(machine: &mut Machine, services: &mut dyn SystemServices) {
    let code = machine.read_register(RET_REG);
    let arg = machine.read_register(ARG1_REG);

    match code {
        SC_HALT => services.halt(),
        SC_EXIT => services.exit(arg),
        SC_PRINT_INT => services.print_int(arg),
        SC_SLEEP => services.sleep(arg),
        _ => eprintln!("Unexpected system call {}", code),
    }

    machine.advance_pc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{NEXT_PC_REG, PC_REG};

    #[derive(Default)]
    struct Recorder {
        calls: Vec<(i32, i32)>,
    }

    impl SystemServices for Recorder {
        fn halt(&mut self) {
            self.calls.push((SC_HALT, 0));
        }
        fn exit(&mut self, status: i32) {
            self.calls.push((SC_EXIT, status));
        }
        fn print_int(&mut self, value: i32) {
            self.calls.push((SC_PRINT_INT, value));
        }
        fn sleep(&mut self, ticks: i32) {
            self.calls.push((SC_SLEEP, ticks));
        }
    }

    fn trap(machine: &mut Machine, recorder: &mut Recorder, code: i32, arg: i32) {
        machine.write_register(RET_REG, code);
        machine.write_register(ARG1_REG, arg);
        handler(machine, recorder);
    }

    #[test]
    fn dispatch_routes_code_and_argument() {
        let mut machine = Machine::new(1);
        let mut recorder = Recorder::default();

        trap(&mut machine, &mut recorder, SC_PRINT_INT, 42);
        trap(&mut machine, &mut recorder, SC_SLEEP, 10);
        trap(&mut machine, &mut recorder, SC_EXIT, -1);
        trap(&mut machine, &mut recorder, SC_HALT, 0);

        assert_eq!(
            recorder.calls,
            vec![
                (SC_PRINT_INT, 42),
                (SC_SLEEP, 10),
                (SC_EXIT, -1),
                (SC_HALT, 0)
            ]
        );
    }

    #[test]
    fn every_trap_advances_the_pc() {
        let mut machine = Machine::new(1);
        machine.write_register(PC_REG, 0);
        machine.write_register(NEXT_PC_REG, 4);
        let mut recorder = Recorder::default();

        trap(&mut machine, &mut recorder, SC_PRINT_INT, 1);
        assert_eq!(machine.read_register(PC_REG), 4);

        // Unknown codes still step the PC; looping on the same trap forever
        // would be worse than ignoring it.
        trap(&mut machine, &mut recorder, 77, 0);
        assert_eq!(machine.read_register(PC_REG), 8);
        assert_eq!(recorder.calls.len(), 1);
    }
}
